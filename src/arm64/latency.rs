//! ARM64 latency table.
//!
//! The values are empirical cycle counts for a generic ARMv8-A core. They
//! only need to be right relative to each other.

use crate::core::error::SchedResult;
use crate::ir::{DataType, Graph, InstId, InstructionKind, InstructionSet, VecOp};
use crate::scheduler::latency::LatencyVisitor;

const INTEGER_OP_LATENCY: u32 = 2;
const FLOATING_POINT_OP_LATENCY: u32 = 5;

const DATA_PROC_WITH_SHIFTER_OP_LATENCY: u32 = 3;
const DIV_DOUBLE_LATENCY: u32 = 30;
const DIV_FLOAT_LATENCY: u32 = 15;
const DIV_INTEGER_LATENCY: u32 = 5;
const LOAD_STRING_INTERNAL_LATENCY: u32 = 7;
const MUL_FLOATING_POINT_LATENCY: u32 = 6;
const MUL_INTEGER_LATENCY: u32 = 6;
const TYPE_CONVERSION_FLOATING_POINT_INTEGER_LATENCY: u32 = 5;
const BRANCH_LATENCY: u32 = INTEGER_OP_LATENCY;

const MEMORY_LOAD_LATENCY: u32 = 5;
const MEMORY_STORE_LATENCY: u32 = 3;

const CALL_INTERNAL_LATENCY: u32 = 10;
const CALL_LATENCY: u32 = 5;

const SIMD_FLOATING_POINT_OP_LATENCY: u32 = 10;
const SIMD_INTEGER_OP_LATENCY: u32 = 6;
const SIMD_MEMORY_LOAD_LATENCY: u32 = 10;
const SIMD_MEMORY_STORE_LATENCY: u32 = 6;
const SIMD_MUL_FLOATING_POINT_LATENCY: u32 = 12;
const SIMD_MUL_INTEGER_LATENCY: u32 = 12;
const SIMD_REPLICATE_OP_LATENCY: u32 = 16;
const SIMD_DIV_DOUBLE_LATENCY: u32 = 60;
const SIMD_DIV_FLOAT_LATENCY: u32 = 30;
const SIMD_TYPE_CONVERSION_INT_TO_FP_LATENCY: u32 = 10;

#[derive(Debug, Default, Clone)]
pub struct Arm64LatencyVisitor {
    last_visited_latency: u32,
    last_visited_internal_latency: u32,
}

impl Arm64LatencyVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, latency: u32) {
        self.last_visited_latency = latency;
    }

    fn visit_binary_operation(&mut self, ty: DataType) {
        self.set(if ty.is_floating_point() {
            FLOATING_POINT_OP_LATENCY
        } else {
            INTEGER_OP_LATENCY
        });
    }

    /// Division or remainder by a constant is strength reduced.
    fn visit_div_rem_constant_integral(&mut self, imm: i64) {
        if imm == 0 {
            self.last_visited_internal_latency = 0;
            self.last_visited_latency = 0;
        } else if imm == 1 || imm == -1 {
            self.last_visited_internal_latency = 0;
            self.last_visited_latency = INTEGER_OP_LATENCY;
        } else if imm.unsigned_abs().is_power_of_two() {
            self.last_visited_internal_latency = 4 * INTEGER_OP_LATENCY;
            self.last_visited_latency = INTEGER_OP_LATENCY;
        } else {
            self.last_visited_internal_latency = 4 * INTEGER_OP_LATENCY;
            self.last_visited_latency = MUL_INTEGER_LATENCY;
        }
    }

    fn visit_div(&mut self, graph: &Graph, instruction: InstId) {
        let inst = graph.inst(instruction);
        match inst.ty {
            DataType::Float32 => self.set(DIV_FLOAT_LATENCY),
            DataType::Float64 => self.set(DIV_DOUBLE_LATENCY),
            _ => match constant_input(graph, instruction, 1) {
                Some(imm) => self.visit_div_rem_constant_integral(imm),
                None => self.set(DIV_INTEGER_LATENCY),
            },
        }
    }

    fn visit_rem(&mut self, graph: &Graph, instruction: InstId) {
        let inst = graph.inst(instruction);
        if inst.ty.is_floating_point() {
            // Lowered to a runtime call.
            self.last_visited_internal_latency = CALL_INTERNAL_LATENCY;
            self.set(CALL_LATENCY);
            return;
        }
        match constant_input(graph, instruction, 1) {
            Some(imm) => self.visit_div_rem_constant_integral(imm),
            None => {
                self.last_visited_internal_latency = DIV_INTEGER_LATENCY;
                self.set(MUL_INTEGER_LATENCY);
            }
        }
    }

    fn visit_type_conversion(&mut self, graph: &Graph, instruction: InstId) {
        let inst = graph.inst(instruction);
        let input_is_fp = inst
            .inputs
            .first()
            .map_or(false, |&input| graph.inst(input).ty.is_floating_point());
        if inst.ty.is_floating_point() || input_is_fp {
            self.set(TYPE_CONVERSION_FLOATING_POINT_INTEGER_LATENCY);
        } else {
            self.set(INTEGER_OP_LATENCY);
        }
    }

    fn visit_simple_arithmetic_simd(&mut self, packed_type: DataType) {
        self.set(if packed_type.is_floating_point() {
            SIMD_FLOATING_POINT_OP_LATENCY
        } else {
            SIMD_INTEGER_OP_LATENCY
        });
    }

    /// Address computation of a vector memory operation.
    fn visit_vec_address(&mut self, graph: &Graph, instruction: InstId) {
        if constant_input(graph, instruction, 1).is_none() {
            self.last_visited_internal_latency += DATA_PROC_WITH_SHIFTER_OP_LATENCY;
        }
    }

    fn visit_vec(&mut self, graph: &Graph, instruction: InstId, op: VecOp) {
        let packed_type = graph.inst(instruction).ty;
        match op {
            VecOp::ExtractScalar
            | VecOp::Reduce
            | VecOp::Neg
            | VecOp::Abs
            | VecOp::Add
            | VecOp::HalvingAdd
            | VecOp::Sub
            | VecOp::Min
            | VecOp::Max
            | VecOp::Shl
            | VecOp::Shr
            | VecOp::UShr
            | VecOp::SetScalars => self.visit_simple_arithmetic_simd(packed_type),
            VecOp::ReplicateScalar => self.set(SIMD_REPLICATE_OP_LATENCY),
            VecOp::Cnv => self.set(SIMD_TYPE_CONVERSION_INT_TO_FP_LATENCY),
            VecOp::Not => {
                if packed_type == DataType::Bool {
                    self.last_visited_internal_latency = SIMD_INTEGER_OP_LATENCY;
                }
                self.set(SIMD_INTEGER_OP_LATENCY);
            }
            VecOp::And | VecOp::AndNot | VecOp::Or | VecOp::Xor => self.set(SIMD_INTEGER_OP_LATENCY),
            VecOp::Mul => self.set(if packed_type.is_floating_point() {
                SIMD_MUL_FLOATING_POINT_LATENCY
            } else {
                SIMD_MUL_INTEGER_LATENCY
            }),
            VecOp::Div => self.set(if packed_type == DataType::Float32 {
                SIMD_DIV_FLOAT_LATENCY
            } else {
                SIMD_DIV_DOUBLE_LATENCY
            }),
            VecOp::MultiplyAccumulate => self.set(SIMD_MUL_INTEGER_LATENCY),
            VecOp::Load { string_char_at } => {
                self.last_visited_internal_latency = 0;
                if packed_type == DataType::Uint16 && string_char_at {
                    // Compressed strings need a check of the compression flag.
                    self.last_visited_internal_latency += MEMORY_LOAD_LATENCY + BRANCH_LATENCY;
                }
                self.visit_vec_address(graph, instruction);
                self.set(SIMD_MEMORY_LOAD_LATENCY);
            }
            VecOp::Store => {
                self.last_visited_internal_latency = 0;
                self.visit_vec_address(graph, instruction);
                self.set(SIMD_MEMORY_STORE_LATENCY);
            }
        }
    }
}

fn constant_input(graph: &Graph, instruction: InstId, index: usize) -> Option<i64> {
    let input = *graph.inst(instruction).inputs.get(index)?;
    graph.as_constant(input)
}

impl LatencyVisitor for Arm64LatencyVisitor {
    fn instruction_set(&self) -> InstructionSet {
        InstructionSet::Arm64
    }

    fn visit(&mut self, graph: &Graph, instruction: InstId) -> SchedResult<()> {
        use InstructionKind::*;
        let inst = graph.inst(instruction);
        match inst.kind {
            Add | Sub | And | Or | Xor | Shl | Shr | UShr | Min | Max | Condition(_) => {
                self.visit_binary_operation(inst.ty)
            }
            Mul => self.set(if inst.ty.is_floating_point() {
                MUL_FLOATING_POINT_LATENCY
            } else {
                MUL_INTEGER_LATENCY
            }),
            Div => self.visit_div(graph, instruction),
            Rem => self.visit_rem(graph, instruction),
            TypeConversion => self.visit_type_conversion(graph, instruction),

            BitwiseNegatedRight => self.set(INTEGER_OP_LATENCY),
            DataProcWithShifterOp => self.set(DATA_PROC_WITH_SHIFTER_OP_LATENCY),
            IntermediateAddress => self.set(INTEGER_OP_LATENCY + 2),
            IntermediateAddressIndex => self.set(DATA_PROC_WITH_SHIFTER_OP_LATENCY + 2),
            MultiplyAccumulate => self.set(MUL_INTEGER_LATENCY),

            ArrayGet => {
                let through_intermediate_address = inst
                    .inputs
                    .first()
                    .map_or(false, |&array| graph.inst(array).kind == IntermediateAddress);
                if !through_intermediate_address {
                    // Address computation.
                    self.last_visited_internal_latency = INTEGER_OP_LATENCY;
                }
                self.set(MEMORY_LOAD_LATENCY);
            }
            ArrayLength => self.set(MEMORY_LOAD_LATENCY),
            ArraySet => self.set(MEMORY_STORE_LATENCY),
            BoundsCheck => {
                self.last_visited_internal_latency = INTEGER_OP_LATENCY;
                // Users do not use any data results.
                self.set(0);
            }
            InstanceFieldGet | StaticFieldGet => self.set(MEMORY_LOAD_LATENCY),
            InstanceOf => {
                self.last_visited_internal_latency = CALL_INTERNAL_LATENCY;
                self.set(INTEGER_OP_LATENCY);
            }
            Invoke => {
                self.last_visited_internal_latency = CALL_INTERNAL_LATENCY;
                self.set(CALL_LATENCY);
            }
            LoadString => {
                self.last_visited_internal_latency = LOAD_STRING_INTERNAL_LATENCY;
                self.set(MEMORY_LOAD_LATENCY);
            }
            NewArray => {
                self.last_visited_internal_latency = INTEGER_OP_LATENCY + CALL_INTERNAL_LATENCY;
                self.set(CALL_LATENCY);
            }
            NewInstance { string_alloc } => {
                self.last_visited_internal_latency = if string_alloc {
                    2 + MEMORY_LOAD_LATENCY + CALL_INTERNAL_LATENCY
                } else {
                    CALL_INTERNAL_LATENCY
                };
                self.set(CALL_LATENCY);
            }
            SuspendCheck => self.set(0),
            Vec(op) => self.visit_vec(graph, instruction, op),

            Parameter(_) | Constant(_) | Neg | Not | Abs | Select | NullCheck | DivZeroCheck
            | CheckCast | BoundType | InstanceFieldSet | StaticFieldSet | Goto | If | Return
            | ReturnVoid => self.set(INTEGER_OP_LATENCY),

            Phi | LoadClass | MonitorOperation | Throw => {
                return Err(self.unhandled(graph, instruction))
            }
        }
        Ok(())
    }

    fn last_visited_latency(&self) -> u32 {
        self.last_visited_latency
    }

    fn last_visited_internal_latency(&self) -> u32 {
        self.last_visited_internal_latency
    }

    fn reset_internal_latency(&mut self) {
        self.last_visited_internal_latency = 0;
    }
}
