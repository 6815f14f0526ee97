// This module computes the block layout facts the scheduler needs from a method's control flow
// graph: a reverse post-order over the blocks reachable from the entry, and natural loops. A
// back edge is an edge whose target is still on the depth-first stack when it is taken; its
// target becomes a loop header and the loop body is every block that reaches the latch without
// passing through the header. Each block is then mapped to the header of the innermost loop
// containing it. The traversal is iterative so deeply nested methods cannot overflow the stack.

//! Reverse post-order and natural loop detection.

use std::collections::{HashMap, HashSet};

use super::{BlockId, Graph};

/// Result of the control flow analysis of one [`Graph`].
#[derive(Debug, Default)]
pub struct LoopAnalysis {
    order: Vec<BlockId>,
    headers: Vec<BlockId>,
    innermost: HashMap<BlockId, BlockId>,
}

impl LoopAnalysis {
    /// Analyze the CFG of `graph`. Block successors must be up to date.
    pub fn run(graph: &Graph) -> Self {
        let mut analysis = Self::default();
        if graph.blocks.is_empty() {
            return analysis;
        }

        // -------- build RPO order and find back edges ---------
        let entry = BlockId(0);
        let mut post = Vec::new();
        let mut back_edges = Vec::new();
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);
        on_stack.insert(entry);
        while let Some((block, next_succ)) = stack.last().copied() {
            let succs = &graph.block(block).successors;
            if next_succ < succs.len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let succ = succs[next_succ];
                if on_stack.contains(&succ) {
                    back_edges.push((block, succ));
                } else if visited.insert(succ) {
                    on_stack.insert(succ);
                    stack.push((succ, 0));
                }
            } else {
                stack.pop();
                on_stack.remove(&block);
                post.push(block);
            }
        }
        post.reverse();
        analysis.order = post;

        // -------- collect loop bodies ---------
        let mut bodies: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
        for (latch, header) in back_edges {
            let body = bodies.entry(header).or_insert_with(|| {
                let mut body = HashSet::new();
                body.insert(header);
                body
            });
            let mut worklist = vec![latch];
            while let Some(block) = worklist.pop() {
                if !body.insert(block) {
                    continue;
                }
                for pred in &graph.block(block).predecessors {
                    if visited.contains(pred) {
                        worklist.push(*pred);
                    }
                }
            }
        }

        // Larger loops first so inner loops overwrite the mapping.
        let mut loops: Vec<(BlockId, HashSet<BlockId>)> = bodies.into_iter().collect();
        loops.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));
        for (header, body) in &loops {
            for block in body {
                analysis.innermost.insert(*block, *header);
            }
        }
        analysis.headers = loops.into_iter().map(|(header, _)| header).collect();
        analysis.headers.sort();
        analysis
    }

    /// Reachable blocks in reverse post-order.
    pub fn reverse_post_order(&self) -> &[BlockId] {
        &self.order
    }

    pub fn headers(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.headers.iter().copied()
    }

    /// `(block, header of its innermost loop)` for every block in a loop.
    pub fn loop_headers(&self) -> impl Iterator<Item = (BlockId, BlockId)> + '_ {
        self.innermost.iter().map(|(block, header)| (*block, *header))
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::Graph;

    #[test]
    fn test_rpo_of_diamond() {
        let graph = Graph::parse(
            r#"
method diamond(%c: bool) {
entry:
  if %c, ^left, ^right
left:
  goto ^join
right:
  goto ^join
join:
  returnvoid
}
"#,
        )
        .unwrap();

        let names: Vec<&str> = graph
            .reverse_post_order()
            .iter()
            .map(|b| graph.block(*b).name.as_str())
            .collect();
        assert_eq!(names.first(), Some(&"entry"));
        assert_eq!(names.last(), Some(&"join"));
        assert_eq!(names.len(), 4);
        assert!(!graph.has_loops());
    }

    #[test]
    fn test_nested_loops_map_to_innermost_header() {
        let graph = Graph::parse(
            r#"
method nested(%c: bool) {
entry:
  goto ^outer
outer:
  if %c, ^inner, ^exit
inner:
  if %c, ^inner_body, ^outer_latch
inner_body:
  goto ^inner
outer_latch:
  goto ^outer
exit:
  returnvoid
}
"#,
        )
        .unwrap();

        let block = |name: &str| graph.block_by_name(name).unwrap();
        assert!(graph.has_loops());
        assert!(graph.block(block("outer")).is_loop_header);
        assert!(graph.block(block("inner")).is_loop_header);
        assert_eq!(graph.block(block("inner_body")).loop_header, Some(block("inner")));
        assert_eq!(graph.block(block("inner")).loop_header, Some(block("inner")));
        assert_eq!(graph.block(block("outer_latch")).loop_header, Some(block("outer")));
        assert_eq!(graph.block(block("entry")).loop_header, None);
        assert_eq!(graph.block(block("exit")).loop_header, None);
    }
}
