//! Overload resolution.
//!
//! Picks the best member from a same-named candidate set for a live
//! argument list, and memoizes the choice per argument-type shape. The
//! policy is deliberate and testable: highest exact-match count, then
//! lowest total conversion weight, then fixed arity over variadic, then
//! discovery order (definition order in the class descriptor).

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use stoat_object::{MessageId, ScriptError, ScriptResult, Value};

use crate::coerce::{ValueKind, WEIGHT_NONE, classify, weight};
use crate::host::{CtorDef, HostType, MethodDef};
use crate::scope::Scope;
use crate::signature::SignatureMatch;

/// Runtime-type tuple of a call site's arguments; the memo key.
pub type ArgShape = SmallVec<[ValueKind; 4]>;

/// Compute the shape of an argument list.
pub fn arg_shape(args: &[Value]) -> ArgShape {
    args.iter().map(classify).collect()
}

/// Append-only memo from argument shape to the winning candidate index.
#[derive(Default)]
pub struct OverloadMemo {
    hits: RwLock<FxHashMap<ArgShape, usize>>,
}

impl OverloadMemo {
    /// Cached winner for a shape.
    pub fn get(&self, shape: &ArgShape) -> Option<usize> {
        self.hits.read().get(shape).copied()
    }

    /// Record a winner. Racing inserts recompute the same value, so
    /// last-write-wins is harmless.
    pub fn insert(&self, shape: ArgShape, winner: usize) {
        self.hits.write().insert(shape, winner);
    }
}

/// Anything overload resolution can choose between.
pub trait Invocable {
    /// Declared parameter types.
    fn params(&self) -> &[HostType];
    /// Whether the trailing parameter is variadic.
    fn variadic(&self) -> bool;
}

impl Invocable for MethodDef {
    fn params(&self) -> &[HostType] {
        &self.params
    }

    fn variadic(&self) -> bool {
        self.variadic
    }
}

impl Invocable for CtorDef {
    fn params(&self) -> &[HostType] {
        &self.params
    }

    fn variadic(&self) -> bool {
        self.variadic
    }
}

/// Score one candidate against live arguments.
pub fn score<C: Invocable>(scope: &Scope, candidate: &C, args: &[Value]) -> SignatureMatch {
    let params = candidate.params();
    if candidate.variadic() {
        if params.is_empty() || args.len() < params.len() - 1 {
            return SignatureMatch::No;
        }
    } else if params.len() != args.len() {
        return SignatureMatch::No;
    }

    let mut exact = 0u32;
    let mut total_weight = 0u32;
    let mut tally = |arg: &Value, target: &HostType| -> bool {
        let w = weight(scope, arg, target);
        if w == WEIGHT_NONE {
            return false;
        }
        if w == 0 {
            exact += 1;
        }
        total_weight = total_weight.saturating_add(w);
        true
    };

    if candidate.variadic() {
        let fixed = params.len() - 1;
        for (arg, target) in args[..fixed.min(args.len())].iter().zip(&params[..fixed]) {
            if !tally(arg, target) {
                return SignatureMatch::No;
            }
        }
        let HostType::Array(component) = &params[fixed] else {
            return SignatureMatch::No;
        };
        for arg in &args[fixed..] {
            // A trailing argument may also be the whole array.
            let as_array = weight(scope, arg, &params[fixed]);
            let as_element = weight(scope, arg, component);
            if args.len() == params.len() && as_array != WEIGHT_NONE && as_array <= as_element {
                if !tally(arg, &params[fixed]) {
                    return SignatureMatch::No;
                }
            } else if !tally(arg, component) {
                return SignatureMatch::No;
            }
        }
    } else {
        for (arg, target) in args.iter().zip(params) {
            if !tally(arg, target) {
                return SignatureMatch::No;
            }
        }
    }
    SignatureMatch::Yes {
        exact,
        total_weight,
    }
}

/// Resolve the best candidate for `args`, without memoization.
///
/// `name` is only used for the error message.
pub fn resolve<C: Invocable>(
    scope: &Scope,
    name: &str,
    candidates: &[Arc<C>],
    args: &[Value],
) -> ScriptResult<usize> {
    let mut best: Option<(usize, u32, u32, bool)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let SignatureMatch::Yes {
            exact,
            total_weight,
        } = score(scope, candidate.as_ref(), args)
        else {
            continue;
        };
        let fixed_arity = !candidate.variadic();
        let better = match &best {
            None => true,
            Some((_, best_exact, best_weight, best_fixed)) => {
                // Ties fall through to discovery order: first wins.
                (exact, std::cmp::Reverse(total_weight), fixed_arity)
                    > (*best_exact, std::cmp::Reverse(*best_weight), *best_fixed)
            }
        };
        if better {
            best = Some((index, exact, total_weight, fixed_arity));
        }
    }
    match best {
        Some((index, ..)) => Ok(index),
        None => {
            let shapes: Vec<String> = args.iter().map(Value::display).collect();
            Err(ScriptError::eval_error(
                MessageId::NoOverloadMatch,
                [name.to_string(), shapes.join(", ")],
            ))
        }
    }
}

/// Memoized resolution: the same call-site shape against the same
/// candidate set always yields the same member.
pub fn resolve_memo<C: Invocable>(
    scope: &Scope,
    name: &str,
    memo: &OverloadMemo,
    candidates: &[Arc<C>],
    args: &[Value],
) -> ScriptResult<usize> {
    let shape = arg_shape(args);
    if let Some(winner) = memo.get(&shape) {
        return Ok(winner);
    }
    let winner = resolve(scope, name, candidates, args)?;
    tracing::trace!(member = name, winner, "overload memo miss");
    memo.insert(shape, winner);
    Ok(winner)
}
