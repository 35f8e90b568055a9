//! Lexical blocks and name resolution during compilation.
//!
//! Blocks live in an append-only arena for the duration of one
//! compilation and refer to their parent by index. A block's id stays
//! valid after it is left, which lets upvalue bookkeeping key captures
//! by the block that owns the captured register.

use crate::compiler::bytecode::MAX_REGISTERS;
use crate::error::CompileErrorKind;
use crate::runtime::Value;
use rustc_hash::FxHashMap;

/// Index of a block in the arena.
pub type BlockId = usize;

/// What opened a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockContext {
    /// A function body; name lookups crossing it become captures
    Function,
    /// A loop; target of break and continue
    Loop,
    /// Any other nested block
    Branch,
}

/// Where a binding lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A register of the declaring function
    Local,
    /// A register captured by a nested function
    Ref,
    /// The VM's global table
    Global,
}

/// A name binding.
#[derive(Debug, Clone)]
pub struct NameInfo {
    /// Folded value of a `const` binding
    pub constant: Option<Value>,
    /// Register of a local binding
    pub register: u32,
    /// Starts `Local`; becomes `Ref` once a nested function captures it
    pub scope: ScopeKind,
}

/// Pending jumps and resolved targets of a loop block.
#[derive(Debug, Default)]
pub struct LoopInfo {
    /// JMP instructions emitted for `break`
    pub breaks: Vec<usize>,
    /// JMP instructions emitted for `continue`
    pub continues: Vec<usize>,
    /// Label after the loop
    pub break_target: Option<usize>,
    /// Label `continue` jumps to
    pub continue_target: Option<usize>,
}

/// One lexical block.
#[derive(Debug)]
pub struct CompilerBlock {
    /// What opened the block
    pub context: BlockContext,
    /// Names declared directly in this block
    pub names: FxHashMap<String, NameInfo>,
    /// Next free register
    pub register: u32,
    /// First register of the block
    pub base: u32,
    /// A nested function captured a binding of this block or of a
    /// nested non-function block
    pub captures: bool,
    /// Enclosing block
    pub parent: Option<BlockId>,
    /// Present for loop blocks
    pub loop_info: Option<LoopInfo>,
    /// Index of the function this block belongs to (0 is the main chunk)
    pub function: usize,
}

/// The result of resolving a name at a use site.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// A `const` binding, folded
    Constant(Value),
    /// A register of the current function
    Local(u32),
    /// A register of an enclosing function
    Ref {
        /// The captured register in the owning function
        register: u32,
        /// The block that declared the name
        owner: BlockId,
    },
    /// Not declared anywhere
    Global,
}

/// The block tree of one compilation.
///
/// The tree always holds the main chunk's function block as its root.
#[derive(Debug)]
pub struct Scope {
    blocks: Vec<CompilerBlock>,
    current: BlockId,
}

impl Scope {
    /// Creates a scope holding only the main chunk's block.
    pub fn new() -> Self {
        Self {
            blocks: vec![CompilerBlock {
                context: BlockContext::Function,
                names: FxHashMap::default(),
                register: 0,
                base: 0,
                captures: false,
                parent: None,
                loop_info: None,
                function: 0,
            }],
            current: 0,
        }
    }

    /// Opens a block inside the current one.
    ///
    /// Function blocks start at register 0; other blocks continue from
    /// the parent's next free register.
    pub fn enter(&mut self, context: BlockContext, function: usize) -> BlockId {
        let register = match context {
            BlockContext::Function => 0,
            _ => self.blocks[self.current].register,
        };
        let id = self.blocks.len();
        self.blocks.push(CompilerBlock {
            context,
            names: FxHashMap::default(),
            register,
            base: register,
            captures: false,
            parent: Some(self.current),
            loop_info: (context == BlockContext::Loop).then(LoopInfo::default),
            function,
        });
        self.current = id;
        id
    }

    /// Closes the current block, handing back its loop bookkeeping.
    ///
    /// The root block is never closed.
    pub fn leave(&mut self) -> Option<LoopInfo> {
        let block = &mut self.blocks[self.current];
        let parent = block.parent?;
        block.names.clear();
        let info = block.loop_info.take();
        let inherited = block.captures && block.context != BlockContext::Function;
        self.current = parent;
        if inherited {
            self.blocks[parent].captures = true;
        }
        info
    }

    /// True when leaving the current block must close the cells of its
    /// registers. Loop bodies are closed by their loop once per
    /// iteration instead.
    pub fn needs_close(&self) -> bool {
        let block = self.current();
        block.context == BlockContext::Branch
            && block.captures
            && block
                .parent
                .is_some_and(|parent| self.blocks[parent].context != BlockContext::Loop)
    }

    /// Id of the current block.
    pub fn current_id(&self) -> BlockId {
        self.current
    }

    /// The current block.
    pub fn current(&self) -> &CompilerBlock {
        &self.blocks[self.current]
    }

    fn current_mut(&mut self) -> &mut CompilerBlock {
        &mut self.blocks[self.current]
    }

    /// Looks up a block by id.
    pub fn block(&self, id: BlockId) -> &CompilerBlock {
        &self.blocks[id]
    }

    /// Next free register of the current block.
    pub fn register(&self) -> u32 {
        self.current().register
    }

    /// Moves the current block's free-register cursor.
    pub fn set_register(&mut self, register: u32) {
        self.current_mut().register = register;
    }

    /// Binds `name` to the next free register of the current block.
    pub fn declare_local(&mut self, name: &str) -> Result<u32, CompileErrorKind> {
        let register = self.register();
        if register as usize >= MAX_REGISTERS {
            return Err(CompileErrorKind::TooManyRegisters);
        }
        self.bind(
            name,
            NameInfo {
                constant: None,
                register,
                scope: ScopeKind::Local,
            },
        )?;
        self.set_register(register + 1);
        Ok(register)
    }

    /// Binds `name` to an already reserved register.
    pub fn declare_register(&mut self, name: &str, register: u32) -> Result<(), CompileErrorKind> {
        self.bind(
            name,
            NameInfo {
                constant: None,
                register,
                scope: ScopeKind::Local,
            },
        )
    }

    /// Binds `name` to a compile-time constant.
    pub fn declare_constant(&mut self, name: &str, value: Value) -> Result<(), CompileErrorKind> {
        self.bind(
            name,
            NameInfo {
                constant: Some(value),
                register: 0,
                scope: ScopeKind::Local,
            },
        )
    }

    fn bind(&mut self, name: &str, info: NameInfo) -> Result<(), CompileErrorKind> {
        let block = self.current_mut();
        if block.names.contains_key(name) {
            return Err(CompileErrorKind::Redeclaration(name.to_string()));
        }
        block.names.insert(name.to_string(), info);
        Ok(())
    }

    /// Resolves `name` from the current block outward.
    ///
    /// Reaching a binding across a function block promotes it to
    /// [`ScopeKind::Ref`]. The promotion sticks, but lookups from inside
    /// the declaring function still see a local register.
    pub fn resolve(&mut self, name: &str) -> Resolved {
        let mut crossed = false;
        let mut cursor = Some(self.current);

        while let Some(id) = cursor {
            let block = &mut self.blocks[id];
            if let Some(info) = block.names.get_mut(name) {
                if let Some(value) = &info.constant {
                    return Resolved::Constant(value.clone());
                }
                if !crossed {
                    return Resolved::Local(info.register);
                }
                info.scope = ScopeKind::Ref;
                let register = info.register;
                block.captures = true;
                return Resolved::Ref { register, owner: id };
            }
            if block.context == BlockContext::Function {
                crossed = true;
            }
            cursor = block.parent;
        }

        Resolved::Global
    }

    /// Finds the binding for `name` without promoting it.
    pub fn find(&self, name: &str) -> Option<&NameInfo> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let block = &self.blocks[id];
            if let Some(info) = block.names.get(name) {
                return Some(info);
            }
            cursor = block.parent;
        }
        None
    }

    /// The innermost loop of the current function, if any.
    pub fn enclosing_loop(&mut self) -> Option<&mut LoopInfo> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            match self.blocks[id].context {
                BlockContext::Loop => return self.blocks[id].loop_info.as_mut(),
                BlockContext::Function => return None,
                BlockContext::Branch => cursor = self.blocks[id].parent,
            }
        }
        None
    }

    /// Records the targets of the current loop block.
    pub fn set_loop_targets(&mut self, continue_target: usize, break_target: usize) {
        if let Some(info) = self.current_mut().loop_info.as_mut() {
            info.continue_target = Some(continue_target);
            info.break_target = Some(break_target);
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}
