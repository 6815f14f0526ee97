// This module implements the HeapLocationCollector, a compact load-store style analysis that
// assigns every array, field and vector memory access of a method to a heap location and
// decides which pairs of locations may alias. A heap location is a reference (looked up
// through null checks, bound types and intermediate addresses to the original value) plus
// either a field or an array index expression with its element type and access width.
// References that are distinct non-escaping allocations never alias; different fields never
// alias; array accesses of different element types never alias; array accesses whose indices
// are provably disjoint (two constants, or the same base plus different constant offsets,
// accounting for the lanes a vector access covers) never alias. Everything else may alias.

//! Heap location collection and alias queries.

use std::collections::HashMap;

use crate::ir::{DataType, FieldId, Graph, InstId, InstructionKind, VecOp};

/// Width of a SIMD register in bytes.
const VECTOR_SIZE_IN_BYTES: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LocationKind {
    InstanceField(FieldId),
    StaticField(FieldId),
    ArrayElement {
        index: IndexExpr,
        ty: DataType,
        vector_length: u32,
    },
}

/// Index expression in the form `base + offset`; a missing base is a
/// constant index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct IndexExpr {
    base: Option<InstId>,
    offset: i64,
}

/// One distinct memory location accessed by the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapLocation {
    reference: Option<InstId>,
    kind: LocationKind,
}

impl HeapLocation {
    pub fn is_array(&self) -> bool {
        matches!(self.kind, LocationKind::ArrayElement { .. })
    }

    pub fn is_field(&self) -> bool {
        !self.is_array()
    }
}

/// Collects the heap locations of a method and answers alias queries.
#[derive(Debug, Default)]
pub struct HeapLocationCollector {
    locations: Vec<HeapLocation>,
    index_of: HashMap<HeapLocation, usize>,
    by_instruction: HashMap<InstId, usize>,
    singletons: HashMap<InstId, bool>,
}

impl HeapLocationCollector {
    /// Visit every block of `graph` and record the location of each memory
    /// access.
    pub fn build(graph: &Graph) -> Self {
        let mut collector = Self::default();
        for block in &graph.blocks {
            for &id in &block.instructions {
                if let Some(location) = collector.location_for(graph, id) {
                    let next = collector.locations.len();
                    let index = *collector.index_of.entry(location).or_insert(next);
                    if index == next {
                        collector.locations.push(location);
                    }
                    collector.by_instruction.insert(id, index);
                }
            }
        }
        log::debug!(
            "{}: collected {} heap location(s)",
            graph.name,
            collector.locations.len()
        );
        collector
    }

    pub fn number_of_heap_locations(&self) -> usize {
        self.locations.len()
    }

    /// Location index of a memory access, `None` if the instruction was not
    /// collected.
    pub fn location_of(&self, id: InstId) -> Option<usize> {
        self.by_instruction.get(&id).copied()
    }

    pub fn location(&self, index: usize) -> &HeapLocation {
        &self.locations[index]
    }

    /// Whether the two locations may refer to overlapping memory.
    pub fn may_alias(&self, loc1: usize, loc2: usize) -> bool {
        if loc1 == loc2 {
            return true;
        }
        let (a, b) = (&self.locations[loc1], &self.locations[loc2]);
        match (a.kind, b.kind) {
            (LocationKind::StaticField(f1), LocationKind::StaticField(f2)) => f1 == f2,
            (LocationKind::InstanceField(f1), LocationKind::InstanceField(f2)) => {
                f1 == f2 && self.references_may_alias(a.reference, b.reference)
            }
            (
                LocationKind::ArrayElement {
                    index: i1,
                    ty: t1,
                    vector_length: l1,
                },
                LocationKind::ArrayElement {
                    index: i2,
                    ty: t2,
                    vector_length: l2,
                },
            ) => {
                t1.to_signed() == t2.to_signed()
                    && self.references_may_alias(a.reference, b.reference)
                    && indices_may_alias(i1, l1, i2, l2)
            }
            _ => false,
        }
    }

    fn references_may_alias(&self, r1: Option<InstId>, r2: Option<InstId>) -> bool {
        match (r1, r2) {
            (Some(r1), Some(r2)) if r1 == r2 => true,
            (Some(r1), Some(r2)) => !(self.is_singleton(r1) || self.is_singleton(r2)),
            _ => true,
        }
    }

    fn is_singleton(&self, reference: InstId) -> bool {
        self.singletons.get(&reference).copied().unwrap_or(false)
    }

    fn location_for(&mut self, graph: &Graph, id: InstId) -> Option<HeapLocation> {
        let inst = graph.inst(id);
        let kind = match inst.kind {
            InstructionKind::InstanceFieldGet | InstructionKind::InstanceFieldSet => {
                LocationKind::InstanceField(inst.field?)
            }
            InstructionKind::StaticFieldGet | InstructionKind::StaticFieldSet => {
                return Some(HeapLocation {
                    reference: None,
                    kind: LocationKind::StaticField(inst.field?),
                });
            }
            InstructionKind::ArrayGet | InstructionKind::ArraySet => LocationKind::ArrayElement {
                index: decompose_index(graph, *inst.inputs.get(1)?),
                ty: inst.ty,
                vector_length: 1,
            },
            InstructionKind::Vec(VecOp::Load { .. }) | InstructionKind::Vec(VecOp::Store) => {
                LocationKind::ArrayElement {
                    index: decompose_index(graph, *inst.inputs.get(1)?),
                    ty: inst.ty,
                    vector_length: (VECTOR_SIZE_IN_BYTES / inst.ty.size().max(1)).max(1),
                }
            }
            _ => return None,
        };
        let reference = original_reference(graph, *inst.inputs.first()?);
        if !self.singletons.contains_key(&reference) {
            let singleton = is_non_escaping_allocation(graph, reference);
            self.singletons.insert(reference, singleton);
        }
        Some(HeapLocation {
            reference: Some(reference),
            kind,
        })
    }
}

/// Look through instructions that forward their reference input.
fn original_reference(graph: &Graph, mut reference: InstId) -> InstId {
    loop {
        let inst = graph.inst(reference);
        match inst.kind {
            InstructionKind::NullCheck
            | InstructionKind::BoundType
            | InstructionKind::IntermediateAddress => match inst.inputs.first() {
                Some(input) => reference = *input,
                None => return reference,
            },
            _ => return reference,
        }
    }
}

fn decompose_index(graph: &Graph, mut index: InstId) -> IndexExpr {
    while graph.inst(index).kind == InstructionKind::BoundsCheck {
        match graph.inst(index).inputs.first() {
            Some(input) => index = *input,
            None => break,
        }
    }
    if let Some(value) = graph.as_constant(index) {
        return IndexExpr {
            base: None,
            offset: value,
        };
    }
    let inst = graph.inst(index);
    if let [lhs, rhs] = inst.inputs[..] {
        match (inst.kind, graph.as_constant(lhs), graph.as_constant(rhs)) {
            (InstructionKind::Add, None, Some(c)) => {
                return IndexExpr {
                    base: Some(lhs),
                    offset: c,
                }
            }
            (InstructionKind::Add, Some(c), None) => {
                return IndexExpr {
                    base: Some(rhs),
                    offset: c,
                }
            }
            (InstructionKind::Sub, None, Some(c)) => {
                return IndexExpr {
                    base: Some(lhs),
                    offset: c.wrapping_neg(),
                }
            }
            _ => {}
        }
    }
    IndexExpr {
        base: Some(index),
        offset: 0,
    }
}

fn indices_may_alias(i1: IndexExpr, len1: u32, i2: IndexExpr, len2: u32) -> bool {
    if i1.base != i2.base {
        return true;
    }
    // Same base: the accesses cover [offset, offset + len).
    let (lo1, hi1) = (i1.offset, i1.offset.saturating_add(len1 as i64));
    let (lo2, hi2) = (i2.offset, i2.offset.saturating_add(len2 as i64));
    lo1 < hi2 && lo2 < hi1
}

/// An allocation whose reference is only used to access its own contents.
fn is_non_escaping_allocation(graph: &Graph, reference: InstId) -> bool {
    if !matches!(
        graph.inst(reference).kind,
        InstructionKind::NewInstance { .. } | InstructionKind::NewArray
    ) {
        return false;
    }
    let mut worklist = vec![reference];
    while let Some(value) = worklist.pop() {
        for &user in graph.uses(value) {
            let inst = graph.inst(user);
            let is_reference_operand = inst.inputs.first() == Some(&value)
                && inst.inputs.iter().filter(|input| **input == value).count() == 1;
            match inst.kind {
                InstructionKind::NullCheck | InstructionKind::BoundType => worklist.push(user),
                InstructionKind::InstanceFieldGet
                | InstructionKind::ArrayGet
                | InstructionKind::ArrayLength
                | InstructionKind::IntermediateAddress
                | InstructionKind::Vec(VecOp::Load { .. }) => {}
                InstructionKind::InstanceFieldSet
                | InstructionKind::ArraySet
                | InstructionKind::Vec(VecOp::Store)
                    if is_reference_operand => {}
                _ => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(text: &str) -> (Graph, HeapLocationCollector) {
        let graph = Graph::parse(text).unwrap();
        let collector = HeapLocationCollector::build(&graph);
        (graph, collector)
    }

    fn loc(graph: &Graph, collector: &HeapLocationCollector, name: &str) -> usize {
        let id = graph.inst_by_name(name).unwrap();
        collector.location_of(id).unwrap()
    }

    #[test]
    fn test_constant_indices() {
        let (graph, c) = collector(
            r#"
method m(%a: ref) {
entry:
  %c0 = const.i32 0
  %c1 = const.i32 1
  %x = aget.i32 %a, %c0
  %y = aget.i32 %a, %c1
  %z = aget.i32 %a, %c0
  returnvoid
}
"#,
        );
        let (x, y, z) = (loc(&graph, &c, "x"), loc(&graph, &c, "y"), loc(&graph, &c, "z"));
        assert_eq!(x, z);
        assert!(!c.may_alias(x, y));
        assert!(c.may_alias(x, z));
        assert_eq!(c.number_of_heap_locations(), 2);
    }

    #[test]
    fn test_offset_indices_and_vectors() {
        let (graph, c) = collector(
            r#"
method m(%a: ref, %i: i32) {
entry:
  %c1 = const.i32 1
  %c4 = const.i32 4
  %i1 = add.i32 %i, %c1
  %i4 = add.i32 %i, %c4
  %x = aget.i32 %a, %i
  %y = aget.i32 %a, %i1
  %v = vload.i32 %a, %i
  %w = vload.i32 %a, %i4
  returnvoid
}
"#,
        );
        let (x, y) = (loc(&graph, &c, "x"), loc(&graph, &c, "y"));
        let (v, w) = (loc(&graph, &c, "v"), loc(&graph, &c, "w"));
        assert!(!c.may_alias(x, y));
        // Four i32 lanes starting at %i cover %i + 1 but not %i + 4.
        assert!(c.may_alias(v, y));
        assert!(!c.may_alias(v, w));
    }

    #[test]
    fn test_element_types_and_unknown_indices() {
        let (graph, c) = collector(
            r#"
method m(%a: ref, %b: ref, %i: i32, %j: i32) {
entry:
  %x = aget.i32 %a, %i
  %y = aget.f32 %a, %j
  %z = aget.i32 %b, %j
  returnvoid
}
"#,
        );
        let (x, y, z) = (loc(&graph, &c, "x"), loc(&graph, &c, "y"), loc(&graph, &c, "z"));
        assert!(!c.may_alias(x, y));
        assert!(c.may_alias(x, z));
    }

    #[test]
    fn test_fields() {
        let (graph, c) = collector(
            r#"
method m(%o: ref, %p: ref) {
entry:
  %n = nullcheck.ref %o
  %x = iget.i32 %n, @Point.x
  %y = iget.i32 %o, @Point.y
  %x2 = iget.i32 %p, @Point.x
  %s = sget.i32 @Point.count
  %t = sget.i32 @Point.total
  returnvoid
}
"#,
        );
        let x = loc(&graph, &c, "x");
        let y = loc(&graph, &c, "y");
        let x2 = loc(&graph, &c, "x2");
        let s = loc(&graph, &c, "s");
        let t = loc(&graph, &c, "t");
        assert!(!c.may_alias(x, y));
        assert!(c.may_alias(x, x2));
        assert!(!c.may_alias(s, t));
        assert!(!c.may_alias(x, s));
        assert!(c.location(x).is_field());
    }

    #[test]
    fn test_fresh_allocations() {
        let (graph, c) = collector(
            r#"
method m(%o: ref, %v: i32) {
entry:
  %fresh = newinstance.ref
  %escaped = newinstance.ref
  iset.i32 %fresh, %v, @Point.x
  iset.ref %o, %escaped, @Holder.value
  %a = iget.i32 %fresh, @Point.x
  %b = iget.i32 %o, @Point.x
  %c = iget.i32 %escaped, @Point.x
  returnvoid
}
"#,
        );
        let a = loc(&graph, &c, "a");
        let b = loc(&graph, &c, "b");
        let cc = loc(&graph, &c, "c");
        assert!(!c.may_alias(a, b));
        assert!(c.may_alias(b, cc));
        assert!(c.location(a).is_field());
        assert!(!c.location(a).is_array());
    }
}
