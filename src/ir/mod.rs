//! HIR: the low-level method representation the scheduler works on.
//!
//! A [`Graph`] is one compiled method: a list of basic blocks, each holding a
//! list of phis and an ordered list of instructions that ends with a control
//! flow instruction. Instructions are stored in one flat table and referred
//! to by [`InstId`]; blocks by [`BlockId`]. Everything the scheduler needs
//! from its host compiler is exposed here:
//! - data inputs and users of every instruction,
//! - environment (deoptimization state) inputs and their holders,
//! - the side-effect descriptor (reads heap, writes heap, can throw),
//! - the instruction kind used for latency dispatch,
//! - loop membership and try regions of each block,
//! - in-place reordering of a block's instructions.
//!
//! The textual form accepted by [`Graph::parse`] looks like:
//!
//! ```text
//! ; Comments start with semicolon
//! method sum(%arr: ref, %n: i32) {
//! entry:
//!   %zero = const.i32 0
//!   %one = const.i32 1
//!   goto ^header
//! header:
//!   %i = phi.i32 [^entry, %zero], [^body, %next]
//!   %done = ge.bool %i, %n
//!   if %done, ^exit, ^body
//! body:
//!   %len = alen.i32 %arr
//!   %idx = boundscheck.i32 %i, %len env(%i)
//!   %v = aget.i32 %arr, %idx
//!   %next = add.i32 %i, %one
//!   goto ^header
//! exit:
//!   returnvoid
//! }
//! ```

use bitflags::bitflags;
use std::fmt;

pub mod loops;
pub mod parser;
mod printer;

use crate::core::error::ParseError;

/// Handle of an instruction (or phi) inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

/// Handle of a basic block inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Handle of a field declared by a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl InstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Target instruction sets known to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionSet {
    Arm,
    Thumb2,
    Arm64,
    Riscv64,
    X86,
    X86_64,
}

impl InstructionSet {
    pub fn name(self) -> &'static str {
        match self {
            InstructionSet::Arm => "arm",
            InstructionSet::Thumb2 => "thumb2",
            InstructionSet::Arm64 => "arm64",
            InstructionSet::Riscv64 => "riscv64",
            InstructionSet::X86 => "x86",
            InstructionSet::X86_64 => "x86_64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "arm" => Some(InstructionSet::Arm),
            "thumb2" => Some(InstructionSet::Thumb2),
            "arm64" | "aarch64" => Some(InstructionSet::Arm64),
            "riscv64" => Some(InstructionSet::Riscv64),
            "x86" => Some(InstructionSet::X86),
            "x86_64" | "x64" => Some(InstructionSet::X86_64),
            _ => None,
        }
    }
}

impl fmt::Display for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value types of the HIR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Uint8,
    Int8,
    Uint16,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Reference,
    Void,
}

impl DataType {
    pub fn is_floating_point(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Size in bytes of a value of this type in memory.
    pub fn size(self) -> u32 {
        match self {
            DataType::Bool | DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Int32 | DataType::Float32 | DataType::Reference => 4,
            DataType::Int64 | DataType::Float64 => 8,
            DataType::Void => 0,
        }
    }

    /// Unsigned types share storage with their signed counterparts.
    pub fn to_signed(self) -> Self {
        match self {
            DataType::Bool | DataType::Uint8 => DataType::Int8,
            DataType::Uint16 => DataType::Int16,
            other => other,
        }
    }

    /// One-letter prefix used in graph dumps (`i12`, `l3`, `v7`, ...).
    pub fn type_id(self) -> char {
        match self {
            DataType::Bool => 'z',
            DataType::Uint8 => 'a',
            DataType::Int8 => 'b',
            DataType::Uint16 => 'c',
            DataType::Int16 => 's',
            DataType::Int32 => 'i',
            DataType::Int64 => 'j',
            DataType::Float32 => 'f',
            DataType::Float64 => 'd',
            DataType::Reference => 'l',
            DataType::Void => 'v',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Uint8 => "u8",
            DataType::Int8 => "i8",
            DataType::Uint16 => "u16",
            DataType::Int16 => "i16",
            DataType::Int32 => "i32",
            DataType::Int64 => "i64",
            DataType::Float32 => "f32",
            DataType::Float64 => "f64",
            DataType::Reference => "ref",
            DataType::Void => "void",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => DataType::Bool,
            "u8" => DataType::Uint8,
            "i8" => DataType::Int8,
            "u16" => DataType::Uint16,
            "i16" => DataType::Int16,
            "i32" => DataType::Int32,
            "i64" => DataType::Int64,
            "f32" => DataType::Float32,
            "f64" => DataType::Float64,
            "ref" => DataType::Reference,
            "void" => DataType::Void,
            _ => return None,
        })
    }
}

bitflags! {
    /// Side-effect descriptor of an instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SideEffects: u8 {
        const READS_HEAP = 1 << 0;
        const WRITES_HEAP = 1 << 1;
        const CAN_THROW = 1 << 2;
    }
}

impl SideEffects {
    pub fn does_any_read(self) -> bool {
        self.contains(SideEffects::READS_HEAP)
    }

    pub fn does_any_write(self) -> bool {
        self.contains(SideEffects::WRITES_HEAP)
    }

    pub fn can_throw(self) -> bool {
        self.contains(SideEffects::CAN_THROW)
    }

    /// Whether these effects read something `other` may write.
    pub fn may_depend_on(self, other: SideEffects) -> bool {
        self.does_any_read() && other.does_any_write()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

/// SIMD operations. For vector instructions, [`Instruction::ty`] is the
/// packed element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VecOp {
    ReplicateScalar,
    ExtractScalar,
    Reduce,
    Cnv,
    Neg,
    Abs,
    Not,
    Add,
    HalvingAdd,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    And,
    AndNot,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
    SetScalars,
    MultiplyAccumulate,
    Load { string_char_at: bool },
    Store,
}

/// Closed set of instruction kinds. Latency tables dispatch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    Parameter(u32),
    Constant(i64),
    Phi,

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
    Min,
    Max,
    Neg,
    Not,
    Abs,
    Condition(ConditionKind),
    Select,
    TypeConversion,

    // Shared ARM forms produced by instruction simplification.
    BitwiseNegatedRight,
    DataProcWithShifterOp,
    IntermediateAddress,
    IntermediateAddressIndex,
    MultiplyAccumulate,

    ArrayGet,
    ArraySet,
    ArrayLength,
    InstanceFieldGet,
    InstanceFieldSet,
    StaticFieldGet,
    StaticFieldSet,

    NullCheck,
    BoundsCheck,
    DivZeroCheck,
    InstanceOf,
    CheckCast,
    BoundType,

    Invoke,
    NewInstance { string_alloc: bool },
    NewArray,
    LoadString,
    LoadClass,
    MonitorOperation,
    SuspendCheck,

    Goto,
    If,
    Return,
    ReturnVoid,
    Throw,

    Vec(VecOp),
}

/// Text mnemonics, kept in one table so parser and printer agree.
const MNEMONICS: &[(&str, InstructionKind)] = &[
    ("phi", InstructionKind::Phi),
    ("add", InstructionKind::Add),
    ("sub", InstructionKind::Sub),
    ("mul", InstructionKind::Mul),
    ("div", InstructionKind::Div),
    ("rem", InstructionKind::Rem),
    ("and", InstructionKind::And),
    ("or", InstructionKind::Or),
    ("xor", InstructionKind::Xor),
    ("shl", InstructionKind::Shl),
    ("shr", InstructionKind::Shr),
    ("ushr", InstructionKind::UShr),
    ("min", InstructionKind::Min),
    ("max", InstructionKind::Max),
    ("neg", InstructionKind::Neg),
    ("not", InstructionKind::Not),
    ("abs", InstructionKind::Abs),
    ("eq", InstructionKind::Condition(ConditionKind::Equal)),
    ("ne", InstructionKind::Condition(ConditionKind::NotEqual)),
    ("lt", InstructionKind::Condition(ConditionKind::LessThan)),
    ("le", InstructionKind::Condition(ConditionKind::LessThanOrEqual)),
    ("gt", InstructionKind::Condition(ConditionKind::GreaterThan)),
    ("ge", InstructionKind::Condition(ConditionKind::GreaterThanOrEqual)),
    ("select", InstructionKind::Select),
    ("conv", InstructionKind::TypeConversion),
    ("bic", InstructionKind::BitwiseNegatedRight),
    ("shifterop", InstructionKind::DataProcWithShifterOp),
    ("iaddr", InstructionKind::IntermediateAddress),
    ("iaddrindex", InstructionKind::IntermediateAddressIndex),
    ("madd", InstructionKind::MultiplyAccumulate),
    ("aget", InstructionKind::ArrayGet),
    ("aset", InstructionKind::ArraySet),
    ("alen", InstructionKind::ArrayLength),
    ("iget", InstructionKind::InstanceFieldGet),
    ("iset", InstructionKind::InstanceFieldSet),
    ("sget", InstructionKind::StaticFieldGet),
    ("sset", InstructionKind::StaticFieldSet),
    ("nullcheck", InstructionKind::NullCheck),
    ("boundscheck", InstructionKind::BoundsCheck),
    ("divzerocheck", InstructionKind::DivZeroCheck),
    ("instanceof", InstructionKind::InstanceOf),
    ("checkcast", InstructionKind::CheckCast),
    ("boundtype", InstructionKind::BoundType),
    ("invoke", InstructionKind::Invoke),
    ("newinstance", InstructionKind::NewInstance { string_alloc: false }),
    ("newarray", InstructionKind::NewArray),
    ("loadstring", InstructionKind::LoadString),
    ("loadclass", InstructionKind::LoadClass),
    ("monitor", InstructionKind::MonitorOperation),
    ("suspendcheck", InstructionKind::SuspendCheck),
    ("goto", InstructionKind::Goto),
    ("if", InstructionKind::If),
    ("return", InstructionKind::Return),
    ("returnvoid", InstructionKind::ReturnVoid),
    ("throw", InstructionKind::Throw),
    ("vreplicate", InstructionKind::Vec(VecOp::ReplicateScalar)),
    ("vextract", InstructionKind::Vec(VecOp::ExtractScalar)),
    ("vreduce", InstructionKind::Vec(VecOp::Reduce)),
    ("vcnv", InstructionKind::Vec(VecOp::Cnv)),
    ("vneg", InstructionKind::Vec(VecOp::Neg)),
    ("vabs", InstructionKind::Vec(VecOp::Abs)),
    ("vnot", InstructionKind::Vec(VecOp::Not)),
    ("vadd", InstructionKind::Vec(VecOp::Add)),
    ("vhadd", InstructionKind::Vec(VecOp::HalvingAdd)),
    ("vsub", InstructionKind::Vec(VecOp::Sub)),
    ("vmul", InstructionKind::Vec(VecOp::Mul)),
    ("vdiv", InstructionKind::Vec(VecOp::Div)),
    ("vmin", InstructionKind::Vec(VecOp::Min)),
    ("vmax", InstructionKind::Vec(VecOp::Max)),
    ("vand", InstructionKind::Vec(VecOp::And)),
    ("vandnot", InstructionKind::Vec(VecOp::AndNot)),
    ("vor", InstructionKind::Vec(VecOp::Or)),
    ("vxor", InstructionKind::Vec(VecOp::Xor)),
    ("vshl", InstructionKind::Vec(VecOp::Shl)),
    ("vshr", InstructionKind::Vec(VecOp::Shr)),
    ("vushr", InstructionKind::Vec(VecOp::UShr)),
    ("vsetscalars", InstructionKind::Vec(VecOp::SetScalars)),
    ("vmadd", InstructionKind::Vec(VecOp::MultiplyAccumulate)),
    ("vload", InstructionKind::Vec(VecOp::Load { string_char_at: false })),
    ("vstore", InstructionKind::Vec(VecOp::Store)),
];

impl InstructionKind {
    /// Kind for a text mnemonic. `const` and parameters are handled by the
    /// parser since they carry an immediate.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        MNEMONICS
            .iter()
            .find(|(m, _)| *m == mnemonic)
            .map(|(_, kind)| *kind)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            InstructionKind::Constant(_) => "const",
            InstructionKind::Parameter(_) => "param",
            InstructionKind::NewInstance { .. } => "newinstance",
            InstructionKind::Vec(VecOp::Load { .. }) => "vload",
            kind => MNEMONICS
                .iter()
                .find(|(_, k)| *k == kind)
                .map(|(m, _)| *m)
                .unwrap_or("?"),
        }
    }

    /// Name used in diagnostics and graph dumps.
    pub fn name(self) -> &'static str {
        use InstructionKind::*;
        match self {
            Parameter(_) => "ParameterValue",
            Constant(_) => "Constant",
            Phi => "Phi",
            Add => "Add",
            Sub => "Sub",
            Mul => "Mul",
            Div => "Div",
            Rem => "Rem",
            And => "And",
            Or => "Or",
            Xor => "Xor",
            Shl => "Shl",
            Shr => "Shr",
            UShr => "UShr",
            Min => "Min",
            Max => "Max",
            Neg => "Neg",
            Not => "Not",
            Abs => "Abs",
            Condition(ConditionKind::Equal) => "Equal",
            Condition(ConditionKind::NotEqual) => "NotEqual",
            Condition(ConditionKind::LessThan) => "LessThan",
            Condition(ConditionKind::LessThanOrEqual) => "LessThanOrEqual",
            Condition(ConditionKind::GreaterThan) => "GreaterThan",
            Condition(ConditionKind::GreaterThanOrEqual) => "GreaterThanOrEqual",
            Select => "Select",
            TypeConversion => "TypeConversion",
            BitwiseNegatedRight => "BitwiseNegatedRight",
            DataProcWithShifterOp => "DataProcWithShifterOp",
            IntermediateAddress => "IntermediateAddress",
            IntermediateAddressIndex => "IntermediateAddressIndex",
            MultiplyAccumulate => "MultiplyAccumulate",
            ArrayGet => "ArrayGet",
            ArraySet => "ArraySet",
            ArrayLength => "ArrayLength",
            InstanceFieldGet => "InstanceFieldGet",
            InstanceFieldSet => "InstanceFieldSet",
            StaticFieldGet => "StaticFieldGet",
            StaticFieldSet => "StaticFieldSet",
            NullCheck => "NullCheck",
            BoundsCheck => "BoundsCheck",
            DivZeroCheck => "DivZeroCheck",
            InstanceOf => "InstanceOf",
            CheckCast => "CheckCast",
            BoundType => "BoundType",
            Invoke => "Invoke",
            NewInstance { .. } => "NewInstance",
            NewArray => "NewArray",
            LoadString => "LoadString",
            LoadClass => "LoadClass",
            MonitorOperation => "MonitorOperation",
            SuspendCheck => "SuspendCheck",
            Goto => "Goto",
            If => "If",
            Return => "Return",
            ReturnVoid => "ReturnVoid",
            Throw => "Throw",
            Vec(op) => match op {
                VecOp::ReplicateScalar => "VecReplicateScalar",
                VecOp::ExtractScalar => "VecExtractScalar",
                VecOp::Reduce => "VecReduce",
                VecOp::Cnv => "VecCnv",
                VecOp::Neg => "VecNeg",
                VecOp::Abs => "VecAbs",
                VecOp::Not => "VecNot",
                VecOp::Add => "VecAdd",
                VecOp::HalvingAdd => "VecHalvingAdd",
                VecOp::Sub => "VecSub",
                VecOp::Mul => "VecMul",
                VecOp::Div => "VecDiv",
                VecOp::Min => "VecMin",
                VecOp::Max => "VecMax",
                VecOp::And => "VecAnd",
                VecOp::AndNot => "VecAndNot",
                VecOp::Or => "VecOr",
                VecOp::Xor => "VecXor",
                VecOp::Shl => "VecShl",
                VecOp::Shr => "VecShr",
                VecOp::UShr => "VecUShr",
                VecOp::SetScalars => "VecSetScalars",
                VecOp::MultiplyAccumulate => "VecMultiplyAccumulate",
                VecOp::Load { .. } => "VecLoad",
                VecOp::Store => "VecStore",
            },
        }
    }

    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            InstructionKind::Goto
                | InstructionKind::If
                | InstructionKind::Return
                | InstructionKind::ReturnVoid
                | InstructionKind::Throw
        )
    }

    pub fn is_constant(self) -> bool {
        matches!(self, InstructionKind::Constant(_))
    }

    pub fn is_unary_operation(self) -> bool {
        matches!(
            self,
            InstructionKind::Neg | InstructionKind::Not | InstructionKind::Abs
        )
    }

    pub fn is_binary_operation(self) -> bool {
        use InstructionKind::*;
        matches!(
            self,
            Add | Sub | Mul | Div | Rem | And | Or | Xor | Shl | Shr | UShr | Min | Max | Condition(_)
        )
    }

    pub fn is_array_access(self) -> bool {
        matches!(self, InstructionKind::ArrayGet | InstructionKind::ArraySet)
    }

    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            InstructionKind::InstanceFieldGet
                | InstructionKind::InstanceFieldSet
                | InstructionKind::StaticFieldGet
                | InstructionKind::StaticFieldSet
        )
    }

    pub fn is_vec_memory_operation(self) -> bool {
        matches!(
            self,
            InstructionKind::Vec(VecOp::Load { .. }) | InstructionKind::Vec(VecOp::Store)
        )
    }

    pub fn is_vec_operation(self) -> bool {
        matches!(self, InstructionKind::Vec(_))
    }

    /// Whether the instruction defines a value usable as an input.
    pub fn produces_value(self, ty: DataType) -> bool {
        ty != DataType::Void && !self.is_control_flow()
    }

    /// Side effects implied by the kind.
    pub fn side_effects(self, ty: DataType, is_volatile: bool) -> SideEffects {
        use InstructionKind::*;
        let reads = SideEffects::READS_HEAP;
        let writes = SideEffects::WRITES_HEAP;
        let throws = SideEffects::CAN_THROW;
        match self {
            ArrayGet => reads,
            ArraySet if ty == DataType::Reference => writes | throws,
            ArraySet => writes,
            InstanceFieldGet | StaticFieldGet | InstanceFieldSet | StaticFieldSet if is_volatile => {
                reads | writes
            }
            InstanceFieldGet | StaticFieldGet => reads,
            InstanceFieldSet | StaticFieldSet => writes,
            NullCheck | BoundsCheck | DivZeroCheck | CheckCast | Throw => throws,
            NewInstance { .. } | NewArray | LoadString => throws,
            LoadClass => reads | throws,
            Invoke | MonitorOperation => reads | writes | throws,
            Vec(VecOp::Load { .. }) => reads,
            Vec(VecOp::Store) => writes,
            _ => SideEffects::empty(),
        }
    }
}

/// A field declared in the method's constant pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub owner: String,
    pub name: String,
    pub is_volatile: bool,
}

/// One HIR instruction (or phi).
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// SSA name without the `%`; empty for instructions without a result.
    pub name: String,
    pub kind: InstructionKind,
    pub ty: DataType,
    pub inputs: Vec<InstId>,
    /// Values captured by the instruction's deoptimization environment.
    pub environment: Vec<InstId>,
    /// Phi incoming blocks or branch targets.
    pub block_operands: Vec<BlockId>,
    pub field: Option<FieldId>,
    pub block: BlockId,
    pub side_effects: SideEffects,
}

impl Instruction {
    pub fn can_throw(&self) -> bool {
        self.side_effects.can_throw()
    }

    pub fn debug_name(&self) -> &'static str {
        self.kind.name()
    }
}

/// A basic block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicBlock {
    pub name: String,
    pub phis: Vec<InstId>,
    /// Instructions in program order; the last one is the control flow.
    pub instructions: Vec<InstId>,
    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
    /// Header of the innermost loop containing this block.
    pub loop_header: Option<BlockId>,
    pub is_loop_header: bool,
    pub in_try: bool,
}

impl BasicBlock {
    pub fn is_in_loop(&self) -> bool {
        self.loop_header.is_some()
    }

    pub fn last_instruction(&self) -> Option<InstId> {
        self.instructions.last().copied()
    }
}

/// A compiled method.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Graph {
    pub name: String,
    pub blocks: Vec<BasicBlock>,
    pub instructions: Vec<Instruction>,
    pub fields: Vec<FieldInfo>,
    uses: Vec<Vec<InstId>>,
    env_uses: Vec<Vec<InstId>>,
    reverse_post_order: Vec<BlockId>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse one method from its textual form.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parser::parse_method(text)
    }

    /// Parse every method of a text file.
    pub fn parse_all(text: &str) -> Result<Vec<Self>, ParseError> {
        parser::parse_methods(text)
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.instructions[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldInfo {
        &self.fields[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.name == name)
            .map(|idx| BlockId(idx as u32))
    }

    pub fn inst_by_name(&self, name: &str) -> Option<InstId> {
        self.instructions
            .iter()
            .position(|i| i.name == name)
            .map(|idx| InstId(idx as u32))
    }

    /// Instructions using `id` as a data input (one entry per use).
    pub fn uses(&self, id: InstId) -> &[InstId] {
        self.uses.get(id.index()).map_or(&[], Vec::as_slice)
    }

    /// Instructions whose environment references `id`.
    pub fn env_uses(&self, id: InstId) -> &[InstId] {
        self.env_uses.get(id.index()).map_or(&[], Vec::as_slice)
    }

    pub fn reverse_post_order(&self) -> &[BlockId] {
        &self.reverse_post_order
    }

    pub fn has_loops(&self) -> bool {
        self.blocks.iter().any(|b| b.is_loop_header)
    }

    pub fn is_loop_header_phi(&self, id: InstId) -> bool {
        let inst = self.inst(id);
        inst.kind == InstructionKind::Phi && self.block(inst.block).is_loop_header
    }

    pub fn as_constant(&self, id: InstId) -> Option<i64> {
        match self.inst(id).kind {
            InstructionKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Identifier used in diagnostics and dot dumps, e.g. `i12`.
    pub fn type_id(&self, id: InstId) -> String {
        format!("{}{}", self.inst(id).ty.type_id(), id.0)
    }

    /// Human readable description, e.g. `ArrayGet i12 (%v)`.
    pub fn describe(&self, id: InstId) -> String {
        let inst = self.inst(id);
        if inst.name.is_empty() {
            format!("{} {}", inst.debug_name(), self.type_id(id))
        } else {
            format!("{} {} (%{})", inst.debug_name(), self.type_id(id), inst.name)
        }
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            name: name.into(),
            ..BasicBlock::default()
        });
        id
    }

    pub fn add_field(&mut self, owner: &str, name: &str, is_volatile: bool) -> FieldId {
        if let Some(idx) = self
            .fields
            .iter()
            .position(|f| f.owner == owner && f.name == name)
        {
            let id = FieldId(idx as u32);
            self.fields[idx].is_volatile |= is_volatile;
            return id;
        }
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(FieldInfo {
            owner: owner.to_string(),
            name: name.to_string(),
            is_volatile,
        });
        id
    }

    /// Append an instruction to `block`. Phis go to the phi list.
    pub fn append(
        &mut self,
        block: BlockId,
        name: impl Into<String>,
        kind: InstructionKind,
        ty: DataType,
        inputs: &[InstId],
    ) -> InstId {
        let id = InstId(self.instructions.len() as u32);
        self.instructions.push(Instruction {
            name: name.into(),
            kind,
            ty,
            inputs: inputs.to_vec(),
            environment: Vec::new(),
            block_operands: Vec::new(),
            field: None,
            block,
            side_effects: SideEffects::empty(),
        });
        let bb = self.block_mut(block);
        if kind == InstructionKind::Phi {
            bb.phis.push(id);
        } else {
            bb.instructions.push(id);
        }
        id
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        &mut self.instructions[id.index()]
    }

    /// Recompute everything derived from the instruction table: side
    /// effects, use lists, CFG edges, reverse post order and loops.
    ///
    /// Must be called after building or editing a graph and before
    /// scheduling it. Reordering instructions inside a block does not
    /// invalidate it.
    pub fn finalize(&mut self) {
        for idx in 0..self.instructions.len() {
            let is_volatile = self.instructions[idx]
                .field
                .map(|f| self.fields[f.0 as usize].is_volatile)
                .unwrap_or(false);
            let inst = &mut self.instructions[idx];
            inst.side_effects = inst.kind.side_effects(inst.ty, is_volatile);
        }

        self.uses = vec![Vec::new(); self.instructions.len()];
        self.env_uses = vec![Vec::new(); self.instructions.len()];
        for (idx, inst) in self.instructions.iter().enumerate() {
            let user = InstId(idx as u32);
            for input in &inst.inputs {
                self.uses[input.index()].push(user);
            }
            for input in &inst.environment {
                let holders = &mut self.env_uses[input.index()];
                if !holders.contains(&user) {
                    holders.push(user);
                }
            }
        }

        for block in &mut self.blocks {
            block.successors.clear();
            block.predecessors.clear();
        }
        for idx in 0..self.blocks.len() {
            let succs = self.blocks[idx]
                .last_instruction()
                .map(|last| self.instructions[last.index()].block_operands.clone())
                .unwrap_or_default();
            for succ in succs {
                if !self.blocks[idx].successors.contains(&succ) {
                    self.blocks[idx].successors.push(succ);
                    self.blocks[succ.index()]
                        .predecessors
                        .push(BlockId(idx as u32));
                }
            }
        }

        let analysis = loops::LoopAnalysis::run(self);
        self.reverse_post_order = analysis.reverse_post_order().to_vec();
        for block in &mut self.blocks {
            block.loop_header = None;
            block.is_loop_header = false;
        }
        for (block, header) in analysis.loop_headers() {
            self.blocks[block.index()].loop_header = Some(header);
        }
        for header in analysis.headers() {
            self.blocks[header.index()].is_loop_header = true;
        }
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        printer::print_method(self, f)
    }
}
