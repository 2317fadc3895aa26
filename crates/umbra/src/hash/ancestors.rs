use super::fingerprint::Fingerprint;

/// One cycle-detection stack: identity tokens of the objects currently being
/// hashed on this recursion path, plus the lowest stack index any
/// back-reference produced so far has pointed at. The latter tells a frame
/// whether its subtree's hash is self-contained (safe to cache) or depends
/// on where the frame happened to sit on the stack.
struct AncestorStack {
    entries: Vec<usize>,
    min_target: usize,
}

impl AncestorStack {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            min_target: usize::MAX,
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) enum StackKind {
    Expr,
    Value,
    Env,
}

/// The three call-scoped ancestor stacks shared by the mutually-recursive
/// hashers. Allocated per top-level call, never shared across calls.
pub(crate) struct Stacks {
    exprs: AncestorStack,
    values: AncestorStack,
    envs: AncestorStack,
    volatile: bool,
}

impl Stacks {
    pub(crate) fn new() -> Self {
        Self {
            exprs: AncestorStack::new(),
            values: AncestorStack::new(),
            envs: AncestorStack::new(),
            volatile: false,
        }
    }

    /// Record that the current subtree's digest embeds identity that can
    /// change while the object stays at the same address (an unresolved
    /// thunk: forcing it rewrites its hash in place). Such digests must
    /// never be cached.
    pub(crate) fn mark_volatile(&mut self) {
        self.volatile = true;
    }

    fn stack_mut(&mut self, kind: StackKind) -> &mut AncestorStack {
        match kind {
            StackKind::Expr => &mut self.exprs,
            StackKind::Value => &mut self.values,
            StackKind::Env => &mut self.envs,
        }
    }

    /// If `token` is already on the stack, return the back-reference digest
    /// for its depth from the top and record the referenced position.
    pub(crate) fn lookup(&mut self, kind: StackKind, token: usize) -> Option<Fingerprint> {
        let stack = self.stack_mut(kind);
        let depth = stack.entries.iter().rev().position(|&entry| entry == token)?;
        let target = stack.entries.len() - 1 - depth;
        stack.min_target = stack.min_target.min(target);
        Some(Fingerprint::back_ref(depth))
    }

    /// Push `token`, run `f`, pop on the way out. Returns `f`'s result and
    /// whether the subtree's digest may be cached: no back-reference inside
    /// it pointed above this frame, and nothing volatile contributed to it.
    pub(crate) fn scoped<R>(
        &mut self,
        kind: StackKind,
        token: usize,
        f: impl FnOnce(&mut Stacks) -> R,
    ) -> (R, bool) {
        let my_index = self.stack_mut(kind).entries.len();
        let saved_min = std::mem::replace(&mut self.stack_mut(kind).min_target, usize::MAX);
        let saved_volatile = std::mem::replace(&mut self.volatile, false);
        self.stack_mut(kind).entries.push(token);
        let result = f(self);
        let subtree_volatile = self.volatile;
        self.volatile = saved_volatile || subtree_volatile;
        let stack = self.stack_mut(kind);
        stack.entries.pop();
        let self_contained = stack.min_target >= my_index;
        stack.min_target = stack.min_target.min(saved_min);
        (result, self_contained && !subtree_volatile)
    }
}
