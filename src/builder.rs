//! Call tree reconstruction from a single-step instruction stream
//!
//! The builder is fed one stop per executed instruction (instruction pointer
//! plus the raw word found there) and never touches the tracee itself. A call
//! opcode arms [`BuilderState::PendingCallee`] so the *next* stop is treated as
//! the callee's first instruction; a return opcode arms
//! [`BuilderState::PendingReturn`] so the next stop is matched against the
//! recorded call sites of the frames above it.
//!
//! # Known approximation
//!
//! Return matching relies on an address window after each call site and on
//! name comparisons to unwind collapsed recursion. Mixed patterns such as
//! mutual recursion between differently named functions can be attributed to
//! the wrong depth.

use crate::call_tree::{CallTree, FrameName, NodeId};
use crate::isa::{Instruction, InstructionSet, X86_64};
use crate::symbols::SymbolResolver;
use tracing::{debug, trace};

/// What the previous stop announced about the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Idle,
    /// A call instruction at `call_site` was just executed
    PendingCallee { call_site: u64 },
    /// A return instruction was just executed
    PendingReturn,
}

/// Incrementally builds a [`CallTree`] from instruction stops
pub struct CallTreeBuilder<'a, R: ?Sized, I = X86_64> {
    symbols: &'a R,
    isa: I,
    entry_symbols: Vec<String>,
    tree: CallTree,
    state: BuilderState,
    /// Entry frame, once reached
    entry: Option<NodeId>,
    /// Most recently created or recursion-merged node; calls attach relative to it
    last: NodeId,
    /// Frame currently executing; receives instruction counts
    active: NodeId,
    /// Depth the next created node will get
    depth: u32,
    /// Working depth at the time of the previous call
    call_depth: u32,
}

impl<'a, R> CallTreeBuilder<'a, R, X86_64>
where
    R: SymbolResolver + ?Sized,
{
    pub fn new<S: Into<String>>(symbols: &'a R, entry_symbols: impl IntoIterator<Item = S>) -> Self {
        Self::with_isa(symbols, X86_64, entry_symbols)
    }
}

impl<'a, R, I> CallTreeBuilder<'a, R, I>
where
    R: SymbolResolver + ?Sized,
    I: InstructionSet,
{
    pub fn with_isa<S: Into<String>>(
        symbols: &'a R,
        isa: I,
        entry_symbols: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            symbols,
            isa,
            entry_symbols: entry_symbols.into_iter().map(Into::into).collect(),
            tree: CallTree::new(),
            state: BuilderState::Idle,
            entry: None,
            last: NodeId::ROOT,
            active: NodeId::ROOT,
            depth: 0,
            call_depth: 0,
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn entry_reached(&self) -> bool {
        self.entry.is_some()
    }

    /// Frame currently receiving instruction counts
    pub fn active(&self) -> NodeId {
        self.active
    }

    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    /// Process one stop at instruction pointer `ip`
    ///
    /// `fetch` yields the raw instruction word at `ip`; it is only invoked
    /// once the entry point has been reached.
    pub fn observe<E>(&mut self, ip: u64, fetch: impl FnOnce() -> Result<u64, E>) -> Result<(), E> {
        if self.entry.is_none() && !self.try_enter(ip) {
            return Ok(());
        }

        match self.state {
            BuilderState::PendingReturn => self.resolve_return(ip),
            BuilderState::PendingCallee { call_site } => self.resolve_callee(ip, call_site),
            BuilderState::Idle => {}
        }

        self.state = match self.isa.classify(fetch()?) {
            Instruction::Call => BuilderState::PendingCallee { call_site: ip },
            Instruction::Return => BuilderState::PendingReturn,
            Instruction::Other => BuilderState::Idle,
        };

        self.tree.count_instruction(self.active);
        Ok(())
    }

    /// Finish tracing: apply recursion depth correction and hand out the tree
    pub fn finish(mut self) -> CallTree {
        self.tree.correct_recursive_depths();
        self.tree
    }

    fn try_enter(&mut self, ip: u64) -> bool {
        let Some(symbol) = self.symbols.resolve(ip) else {
            return false;
        };
        if !self.entry_symbols.iter().any(|entry| entry == symbol) {
            return false;
        }

        debug!("entry point {} reached at {:#x}", symbol, ip);
        let entry = self
            .tree
            .attach_entry(FrameName::Symbol(symbol.to_string()), ip);
        self.entry = Some(entry);
        self.last = entry;
        self.active = entry;
        self.call_depth = 0;
        self.depth = 1;
        true
    }

    fn resolve_callee(&mut self, ip: u64, call_site: u64) {
        let symbol = self.symbols.resolve(ip);
        if symbol.is_none() {
            debug!("no symbol for callee at {:#x}", ip);
        }
        let name = FrameName::from_symbol(symbol);

        let node = if self.depth == self.call_depth + 1
            && self.tree[self.last].name.same_function(&name)
        {
            self.tree[self.last].recursive_calls += 1;
            trace!(
                "recursive call to {} merged ({})",
                name,
                self.tree[self.last].recursive_calls
            );
            self.last
        } else {
            self.place(name, call_site)
        };

        self.call_depth = self.depth;
        self.last = node;
        self.active = node;
        self.depth += 1;
    }

    fn place(&mut self, name: FrameName, call_site: u64) -> NodeId {
        let id = if self.depth <= self.tree[self.last].depth {
            let mut prev = self.last;
            while self.tree[prev].depth > self.depth {
                match self.tree[prev].parent() {
                    Some(parent) => prev = parent,
                    None => break,
                }
            }
            self.tree
                .attach_sibling(prev, name, call_site, self.depth)
        } else {
            self.tree
                .attach_child(self.last, name, call_site, self.depth)
        };
        trace!(
            "call {} at depth {} (site {:#x})",
            self.tree[id].name,
            self.depth,
            call_site
        );
        id
    }

    fn resolve_return(&mut self, ip: u64) {
        let last = self.last;

        // Nearest frame whose call site the tracee resumed after
        let mut active = last;
        let mut cursor = Some(last);
        while let Some(id) = cursor.filter(|&id| self.tree[id].depth > 0) {
            if self.isa.is_return_site(self.tree[id].return_site, ip) {
                self.depth = self.tree[id].depth;
                active = self.tree[id].parent().unwrap_or(NodeId::ROOT);
                break;
            }
            cursor = self.tree[id].parent();
        }

        // Unwind past frames merged from the same recursive function
        let name = &self.tree[last].name;
        while self.tree[active].depth > 0 && self.tree[active].name.same_function(name) {
            match self.tree[active].parent() {
                Some(parent) => active = parent,
                None => break,
            }
        }

        // Returning out of the placement cursor's parent overrides the walk above
        if let Some(parent) = self.tree[last].parent() {
            let p = &self.tree[parent];
            if p.depth > 0
                && !p.name.same_function(name)
                && self.isa.is_return_site(p.return_site, ip)
            {
                self.depth = p.depth;
                active = p.parent().unwrap_or(NodeId::ROOT);
            }
        }

        self.active = active;
    }
}
