#![no_main]

use arbitrary::Arbitrary;
use holdwire_core::{Holder, HolderError, NumericHolderExt, RwHolder, combine_n};
use libfuzzer_sys::fuzz_target;

const ROOTS: usize = 4;

#[derive(Arbitrary, Debug)]
enum GraphOp {
    Set { root: u8, value: i32 },
    Fail { root: u8 },
    Add { lhs: u8, rhs: u8 },
    DivConst { node: u8, divisor: i32 },
    RemConst { node: u8, divisor: i32 },
    Sum { nodes: Vec<u8> },
    Subscribe { node: u8 },
    Drop { node: u8 },
}

fuzz_target!(|ops: Vec<GraphOp>| {
    let roots: Vec<RwHolder<i32>> = (0..ROOTS).map(|_| RwHolder::new()).collect();
    let mut nodes: Vec<Holder<i32>> = roots.iter().map(RwHolder::holder).collect();
    let mut subscriptions = Vec::new();

    let pick = |nodes: &Vec<Holder<i32>>, i: u8| nodes[usize::from(i) % nodes.len()].clone();

    for op in ops.into_iter().take(256) {
        match op {
            GraphOp::Set { root, value } => {
                roots[usize::from(root) % ROOTS].set(value);
            }
            GraphOp::Fail { root } => {
                roots[usize::from(root) % ROOTS].fail(HolderError::transform("fuzz"));
            }
            GraphOp::Add { lhs, rhs } => {
                let derived = pick(&nodes, lhs).add(&pick(&nodes, rhs));
                nodes.push(derived);
            }
            GraphOp::DivConst { node, divisor } => {
                let source = pick(&nodes, node);
                let derived = source.div_const(divisor);
                if divisor == 0 && source.is_available() {
                    assert!(derived.is_failed());
                }
                nodes.push(derived);
            }
            GraphOp::RemConst { node, divisor } => {
                nodes.push(pick(&nodes, node).rem_const(divisor));
            }
            GraphOp::Sum { nodes: picks } => {
                let sources: Vec<Holder<i32>> =
                    picks.iter().take(8).map(|i| pick(&nodes, *i)).collect();
                nodes.push(combine_n(&sources, |values: &[i32]| {
                    values.iter().fold(0i32, |acc, v| acc.wrapping_add(*v))
                }));
            }
            GraphOp::Subscribe { node } => {
                subscriptions.push(pick(&nodes, node).subscribe(|_| {}));
            }
            GraphOp::Drop { node } => {
                if nodes.len() > ROOTS {
                    let index = ROOTS + usize::from(node) % (nodes.len() - ROOTS);
                    nodes.swap_remove(index);
                }
            }
        }
    }

    drop(subscriptions);
    nodes.truncate(ROOTS);
    for root in &roots {
        assert_eq!(root.listener_count(), 0, "derived holders leaked a listener");
    }
});
