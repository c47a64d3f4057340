//! Generic tree node framework
//!
//! Expressions and logical plans are both immutable trees. Every
//! transformation in the crate is driven by the combinators here: a rule
//! is a partial function returning `Some(rewritten)` on match and `None`
//! otherwise, and the transforms rebuild only the subtrees that actually
//! changed so callers can detect convergence with plain equality.

pub trait TreeNode: Clone + PartialEq {
    /// Direct children of this node, in order.
    fn children(&self) -> Vec<&Self>;

    /// Rebuild this node with the given children. The caller must pass
    /// exactly `self.children().len()` nodes, in the same order.
    fn with_new_children(&self, children: Vec<Self>) -> Self;

    /// One-line rendering of this node (children excluded), used by
    /// [`pretty_tree`](TreeNode::pretty_tree).
    fn node_label(&self) -> String;

    /// Reference equality or structural equality.
    fn same_as(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self == other
    }

    /// Apply `f` to each child; a new node is constructed only if at
    /// least one child changed, otherwise `self` passes through.
    fn map_children<F>(&self, f: &mut F) -> Self
    where
        F: FnMut(&Self) -> Self,
    {
        let old = self.children();
        if old.is_empty() {
            return self.clone();
        }
        let new: Vec<Self> = old.iter().map(|c| f(c)).collect();
        if old.iter().zip(new.iter()).all(|(o, n)| *o == n) {
            self.clone()
        } else {
            self.with_new_children(new)
        }
    }

    /// Apply `rule` to this node first, then recurse into the children
    /// of the (possibly rewritten) result.
    fn transform_down<F>(&self, rule: &F) -> Self
    where
        F: Fn(&Self) -> Option<Self>,
    {
        let applied = rule(self).unwrap_or_else(|| self.clone());
        applied.map_children(&mut |c| c.transform_down(rule))
    }

    /// Recurse into children first, then apply `rule` to the rebuilt node.
    fn transform_up<F>(&self, rule: &F) -> Self
    where
        F: Fn(&Self) -> Option<Self>,
    {
        let below = self.map_children(&mut |c| c.transform_up(rule));
        rule(&below).unwrap_or(below)
    }

    /// Pre-order accumulation of all matched projections.
    fn collect<T, F>(&self, f: &F) -> Vec<T>
    where
        F: Fn(&Self) -> Option<T>,
    {
        let mut out = Vec::new();
        self.collect_into(f, &mut out);
        out
    }

    fn collect_into<T, F>(&self, f: &F, out: &mut Vec<T>)
    where
        F: Fn(&Self) -> Option<T>,
    {
        if let Some(t) = f(self) {
            out.push(t);
        }
        for child in self.children() {
            child.collect_into(f, out);
        }
    }

    /// Short-circuiting existential over the whole subtree.
    fn exists<F>(&self, f: &F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        f(self) || self.children().iter().any(|c| c.exists(f))
    }

    /// Short-circuiting universal over the whole subtree.
    fn forall<F>(&self, f: &F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        f(self) && self.children().iter().all(|c| c.forall(f))
    }

    /// Total number of nodes in this subtree.
    fn size(&self) -> usize {
        1 + self.children().iter().map(|c| c.size()).sum::<usize>()
    }

    /// Length of the longest root-to-leaf path.
    fn depth(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(|c| c.depth())
            .max()
            .unwrap_or(0)
    }

    /// Render the subtree with box-drawing characters:
    ///
    /// ```text
    /// Project
    /// └─ Filter
    ///    ├─ ...
    ///    └─ ...
    /// ```
    fn pretty_tree(&self) -> String {
        let mut out = String::new();
        self.render_tree(&mut out, "", true, true);
        out
    }

    fn render_tree(&self, out: &mut String, prefix: &str, is_last: bool, is_root: bool) {
        if is_root {
            out.push_str(&self.node_label());
        } else {
            out.push_str(prefix);
            out.push_str(if is_last { "└─ " } else { "├─ " });
            out.push_str(&self.node_label());
        }
        out.push('\n');

        let children = self.children();
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            let child_prefix = if is_root {
                String::new()
            } else {
                format!("{}{}", prefix, if is_last { "   " } else { "│  " })
            };
            child.render_tree(out, &child_prefix, i + 1 == count, false);
        }
    }
}
