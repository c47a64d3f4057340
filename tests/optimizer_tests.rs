//! End-to-end optimizer scenarios and laws

use query_core::planner::predicate::is_cnf;
use query_core::{
    lit, Attribute, DataType, Expr, JoinType, LogicalPlan, LogicalPlanBuilder, Optimizer, TreeNode,
};

fn attr(name: &str, data_type: DataType) -> Attribute {
    Attribute::new(name, data_type, false)
}

fn int_rel(names: &[&str]) -> (LogicalPlan, Vec<Expr>) {
    let attrs: Vec<Attribute> = names.iter().map(|n| attr(n, DataType::Int)).collect();
    let exprs = attrs.iter().cloned().map(Expr::Attribute).collect();
    (LogicalPlanBuilder::relation(attrs).build(), exprs)
}

fn optimize(plan: LogicalPlan) -> LogicalPlan {
    Optimizer::new().optimize(plan).unwrap()
}

#[test]
fn adjacent_filters_become_one() {
    let (rel, cols) = int_rel(&["a"]);
    let a = &cols[0];
    let plan = rel
        .clone()
        .filter(a.clone().gt(lit(1i32)))
        .filter(a.clone().lt(lit(10i32)));

    let optimized = optimize(plan);
    let expected = rel.filter(a.clone().gt(lit(1i32)).and(a.clone().lt(lit(10i32))));
    assert_eq!(optimized, expected);
}

#[test]
fn nested_limits_fold_to_the_minimum() {
    let (rel, _) = int_rel(&["a"]);
    let plan = rel.clone().limit(lit(5i32)).limit(lit(3i32));

    let optimized = optimize(plan);
    assert_eq!(optimized, rel.limit(lit(3i32)));
}

#[test]
fn inner_join_filter_splits_by_side() {
    let (left, lcols) = int_rel(&["a", "b"]);
    let (right, rcols) = int_rel(&["c"]);
    let (a, b, c) = (&lcols[0], &lcols[1], &rcols[0]);

    let join = LogicalPlanBuilder::from_plan(left.clone())
        .join(right.clone(), JoinType::Inner, None)
        .unwrap()
        .build();
    let plan = join.filter(a.clone().eq(c.clone()).and(b.clone().gt(lit(0i32))));

    let optimized = optimize(plan);
    match optimized {
        LogicalPlan::Join(node) => {
            assert_eq!(node.condition, Some(a.clone().eq(c.clone())));
            assert_eq!(node.left.as_ref(), &left.filter(b.clone().gt(lit(0i32))));
            assert_eq!(node.right.as_ref(), &right);
        }
        other => panic!("expected Join, got {}", other.node_label()),
    }
}

#[test]
fn stacked_projections_inline() {
    let (rel, cols) = int_rel(&["a"]);
    let a = &cols[0];
    let inner = a.clone().add(lit(1i32)).alias("x");
    let x = Expr::Attribute(inner.to_attribute().unwrap());
    let outer = x.add(lit(2i32)).alias("y");
    let (outer_name, outer_id) = match &outer {
        Expr::Alias { name, id, .. } => (name.clone(), *id),
        _ => unreachable!(),
    };

    let plan = rel
        .clone()
        .project(vec![inner])
        .unwrap()
        .project(vec![outer])
        .unwrap();
    let optimized = optimize(plan);

    let inlined = Expr::Alias {
        child: Box::new(a.clone().add(lit(1i32)).add(lit(2i32))),
        name: outer_name,
        id: outer_id,
    };
    assert_eq!(optimized, rel.project(vec![inlined]).unwrap());
}

#[test]
fn negations_reduce_and_normalize() {
    let (rel, cols) = int_rel(&["a", "b"]);
    let (a, b) = (&cols[0], &cols[1]);
    let plan = rel.clone().filter(
        a.clone()
            .eq(lit(1i32))
            .and(b.clone().eq(lit(2i32)).not())
            .not(),
    );

    let optimized = optimize(plan);
    let expected = rel.filter(
        a.clone()
            .not_eq(lit(1i32))
            .or(b.clone().eq(lit(2i32))),
    );
    assert_eq!(optimized, expected);
}

#[test]
fn limits_push_through_unions() {
    let (left, _) = int_rel(&["a"]);
    let (right, _) = int_rel(&["a"]);
    let plan = LogicalPlanBuilder::from_plan(left.clone())
        .union(right.clone())
        .build();
    let plan = LogicalPlanBuilder::from_plan(plan.limit(lit(5i32)))
        .limit(lit(3i32))
        .build();

    let optimized = optimize(plan);
    let expected = LogicalPlanBuilder::from_plan(left.limit(lit(3i32)))
        .union(right.limit(lit(3i32)))
        .limit(lit(3i32))
        .build();
    assert_eq!(optimized, expected);
}

#[test]
fn union_of_limited_branches_under_limit() {
    // Limit 3 over Union(Limit(L, 5), Limit(R, 5)): the inner bounds
    // tighten to 3 and a single outer bound remains.
    let (left, _) = int_rel(&["a"]);
    let (right, _) = int_rel(&["a"]);
    let plan = LogicalPlanBuilder::from_plan(left.clone().limit(lit(5i32)))
        .union(right.clone().limit(lit(5i32)))
        .limit(lit(3i32))
        .build();

    let optimized = optimize(plan);
    let expected = LogicalPlanBuilder::from_plan(left.limit(lit(3i32)))
        .union(right.limit(lit(3i32)))
        .limit(lit(3i32))
        .build();
    assert_eq!(optimized, expected);
}

#[test]
fn closed_expressions_fold_to_literals() {
    let (rel, _) = int_rel(&["a"]);
    let plan = rel
        .clone()
        .project(vec![lit(1i32).add(lit(2i32).multiply(lit(3i32))).alias("x")])
        .unwrap();

    let optimized = optimize(plan);
    match &optimized {
        LogicalPlan::Project(node) => match &node.exprs[0] {
            Expr::Alias { child, .. } => assert_eq!(**child, lit(7i32)),
            other => panic!("expected alias, got {other}"),
        },
        other => panic!("expected Project, got {}", other.node_label()),
    }
}

#[test]
fn false_filter_empties_the_relation() {
    let (rel, cols) = int_rel(&["a"]);
    let a = &cols[0];
    // a > 1 AND 1 > 2 folds to FALSE, which erases the filter entirely
    let plan = rel.filter(a.clone().gt(lit(1i32)).and(lit(1i32).gt(lit(2i32))));

    let optimized = optimize(plan);
    match optimized {
        LogicalPlan::LocalRelation(node) => assert!(node.rows.is_empty()),
        other => panic!("expected LocalRelation, got {}", other.node_label()),
    }
}

#[test]
fn subquery_wrappers_are_erased() {
    let (rel, cols) = int_rel(&["a"]);
    let a = cols[0].clone();
    let qualified = match a {
        Expr::Attribute(attr) => Expr::Attribute(attr.with_qualifier("t")),
        _ => unreachable!(),
    };
    let plan = rel
        .clone()
        .subquery("t")
        .filter(qualified.gt(lit(1i32)));

    let optimized = optimize(plan);
    let expected = rel.filter(cols[0].clone().gt(lit(1i32)));
    assert_eq!(optimized, expected);
}

#[test]
fn optimization_is_idempotent() {
    let (left, lcols) = int_rel(&["a", "b"]);
    let (right, rcols) = int_rel(&["c"]);
    let (a, b, c) = (&lcols[0], &lcols[1], &rcols[0]);

    let plan = LogicalPlanBuilder::from_plan(left)
        .join(right, JoinType::Inner, None)
        .unwrap()
        .filter(a.clone().eq(c.clone()).and(b.clone().gt(lit(0i32))))
        .limit(lit(5i32))
        .limit(lit(3i32))
        .build();

    let once = optimize(plan);
    let twice = optimize(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn optimization_preserves_the_output_schema() {
    let (rel, cols) = int_rel(&["a", "b"]);
    let (a, b) = (&cols[0], &cols[1]);
    let plan = rel
        .project(vec![
            a.clone().add(lit(1i32)).alias("x"),
            b.clone().alias("y"),
        ])
        .unwrap()
        .filter(lit(true))
        .limit(lit(10i32));

    let before: Vec<(String, DataType, bool)> = plan
        .output()
        .unwrap()
        .into_iter()
        .map(|attr| (attr.name, attr.data_type, attr.nullable))
        .collect();
    let optimized = optimize(plan);
    let after: Vec<(String, DataType, bool)> = optimized
        .output()
        .unwrap()
        .into_iter()
        .map(|attr| (attr.name, attr.data_type, attr.nullable))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn filter_conditions_end_in_cnf() {
    let (rel, cols) = int_rel(&["a", "b", "c"]);
    let (a, b, c) = (&cols[0], &cols[1], &cols[2]);
    let plan = rel.filter(
        a.clone()
            .gt(lit(1i32))
            .or(b.clone().gt(lit(2i32)).and(c.clone().gt(lit(3i32)))),
    );

    let optimized = optimize(plan);
    assert!(optimized.exists(&|p| matches!(p, LogicalPlan::Filter(_))));
    assert!(optimized.forall(&|p| match p {
        LogicalPlan::Filter(node) => is_cnf(&node.predicate),
        _ => true,
    }));
}

#[test]
fn filter_pushes_through_project_then_merges() {
    // Filter over Project over Filter collapses into a single filter
    // below the projection.
    let (rel, cols) = int_rel(&["a"]);
    let a = &cols[0];
    let aliased = a.clone().add(lit(1i32)).alias("x");
    let x = Expr::Attribute(aliased.to_attribute().unwrap());

    let plan = rel
        .clone()
        .filter(a.clone().gt(lit(0i32)))
        .project(vec![aliased.clone()])
        .unwrap()
        .filter(x.lt(lit(100i32)));

    let optimized = optimize(plan);
    let expected = rel
        .filter(
            a.clone()
                .gt(lit(0i32))
                .and(a.clone().add(lit(1i32)).lt(lit(100i32))),
        )
        .project(vec![aliased])
        .unwrap();
    assert_eq!(optimized, expected);
}
