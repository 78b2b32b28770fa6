//! Pre/post/replacement hooks around one operation.
//!
//! # Invariants
//! - Pre hooks run in registration order before the operation.
//! - At most one replacement exists; a second one needs `force`.
//! - Post hooks run in registration order after the operation and see its result.

type PreHook<A> = Box<dyn FnMut(&A)>;
type PostHook<A, R> = Box<dyn FnMut(&A, &R)>;
type Replacement<A, R> = Box<dyn FnMut(&A) -> R>;

/// Handle returned on registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Hook lists wrapped around an operation taking `&A` and returning `R`.
pub struct Hookable<A: ?Sized, R = ()> {
    next_id: u64,
    pre: Vec<(HookId, PreHook<A>)>,
    post: Vec<(HookId, PostHook<A, R>)>,
    replacement: Option<(HookId, Replacement<A, R>)>,
}

impl<A: ?Sized, R> Default for Hookable<A, R> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pre: Vec::new(),
            post: Vec::new(),
            replacement: None,
        }
    }
}

impl<A: ?Sized, R> std::fmt::Debug for Hookable<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hookable")
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .field("replaced", &self.replacement.is_some())
            .finish()
    }
}

impl<A: ?Sized, R> Hookable<A, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre_hook(&mut self, hook: impl FnMut(&A) + 'static) -> HookId {
        let id = self.allocate_id();
        self.pre.push((id, Box::new(hook)));
        id
    }

    pub fn add_post_hook(&mut self, hook: impl FnMut(&A, &R) + 'static) -> HookId {
        let id = self.allocate_id();
        self.post.push((id, Box::new(hook)));
        id
    }

    /// Installs a replacement for the wrapped operation.
    ///
    /// Returns `None` when a replacement is already installed and `force` is
    /// false.
    pub fn set_replacement(
        &mut self,
        hook: impl FnMut(&A) -> R + 'static,
        force: bool,
    ) -> Option<HookId> {
        if self.replacement.is_some() && !force {
            return None;
        }
        let id = self.allocate_id();
        self.replacement = Some((id, Box::new(hook)));
        Some(id)
    }

    /// Removes a hook of any kind. Returns `false` for unknown ids.
    pub fn remove(&mut self, id: HookId) -> bool {
        if let Some(position) = self.pre.iter().position(|(hook_id, _)| *hook_id == id) {
            self.pre.remove(position);
            return true;
        }
        if let Some(position) = self.post.iter().position(|(hook_id, _)| *hook_id == id) {
            self.post.remove(position);
            return true;
        }
        if matches!(self.replacement, Some((hook_id, _)) if hook_id == id) {
            self.replacement = None;
            return true;
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty() && self.replacement.is_none()
    }

    /// Runs pre hooks, then the replacement or `operation`, then post hooks.
    pub fn invoke(&mut self, arg: &A, operation: impl FnOnce(&A) -> R) -> R {
        for (_, hook) in &mut self.pre {
            hook(arg);
        }
        let result = match &mut self.replacement {
            Some((_, replacement)) => replacement(arg),
            None => operation(arg),
        };
        for (_, hook) in &mut self.post {
            hook(arg, &result);
        }
        result
    }

    fn allocate_id(&mut self) -> HookId {
        self.next_id += 1;
        HookId(self.next_id)
    }
}
