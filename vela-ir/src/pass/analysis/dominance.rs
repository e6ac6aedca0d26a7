use crate::ir::Function;

/// Dominator tree over block indices, computed with the iterative algorithm of
/// Cooper, Harvey and Kennedy.
#[derive(Clone, Debug)]
pub struct DominatorTree {
    idom: Vec<Option<usize>>,
    rpo: Vec<usize>,
}

fn intersect(idom: &[Option<usize>], order: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while order[a] > order[b] {
            match idom[a] {
                Some(next) => a = next,
                None => return 0,
            }
        }
        while order[b] > order[a] {
            match idom[b] {
                Some(next) => b = next,
                None => return 0,
            }
        }
    }
    a
}

impl DominatorTree {
    pub fn compute(function: &Function) -> Self {
        let n = function.blocks.len();
        let rpo = function.reverse_post_order();
        let mut order = vec![usize::MAX; n];
        for (position, &block) in rpo.iter().enumerate() {
            order[block] = position;
        }
        let preds = function.predecessors();
        let mut idom = vec![None; n];
        if n > 0 {
            idom[0] = Some(0);
        }
        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom = None;
                for &pred in &preds[block] {
                    if idom[pred].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &order, pred, current),
                    });
                }
                if new_idom.is_some() && new_idom != idom[block] {
                    idom[block] = new_idom;
                    changed = true;
                }
            }
        }
        Self { idom, rpo }
    }

    /// Immediate dominator; `None` for the entry block and unreachable blocks.
    pub fn idom(&self, block: usize) -> Option<usize> {
        match self.idom.get(block).copied().flatten() {
            Some(dom) if dom != block => Some(dom),
            _ => None,
        }
    }

    pub fn is_reachable(&self, block: usize) -> bool {
        self.idom.get(block).is_some_and(|d| d.is_some())
    }

    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    /// Reachable blocks in reverse post-order; every block comes after its dominators.
    pub fn reverse_post_order(&self) -> &[usize] {
        &self.rpo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    #[test]
    fn test_loop_dominance() {
        let text = r#"
fn @f(%0 : i1) -> () {
bb0:
  br bb1
bb1:
  cond_br %0, bb2, bb3
bb2:
  br bb1
bb3:
  return
bb4:
  br bb3
}
"#;
        let module = parse_module(text, "m").unwrap();
        let tree = DominatorTree::compute(&module.functions[0]);
        assert_eq!(tree.idom(0), None);
        assert_eq!(tree.idom(1), Some(0));
        assert_eq!(tree.idom(2), Some(1));
        assert_eq!(tree.idom(3), Some(1));
        assert!(tree.dominates(1, 2));
        assert!(!tree.dominates(2, 3));
        assert!(tree.dominates(3, 3));
        assert!(!tree.is_reachable(4));
        assert!(!tree.dominates(0, 4));
    }
}
