//! Tree reductions over groups and collections.
//!
//! A reduction is identified by `(scope, tag, sequence)`, the sequence
//! auto-incremented per `(scope, tag)` so overlapping reductions stay
//! separate. Combiner operators are registered up front and addressed by
//! dense ids, like handlers, so intermediate nodes can combine values they
//! never asked for.

mod manager;

pub(crate) use manager::{ReduceEdges, ReduceEffect, ReduceKey, ReduceManager, ReduceScope};

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use weft_serde::{Serde, SerdeErr};

/// A pure binary combiner over a serializable value.
pub trait ReduceOp: 'static {
    type Value: Serde + 'static;

    fn combine(a: Self::Value, b: Self::Value) -> Self::Value;
}

/// Addition.
pub struct PlusOp<T>(PhantomData<T>);

impl<T: Serde + std::ops::Add<Output = T> + 'static> ReduceOp for PlusOp<T> {
    type Value = T;

    fn combine(a: T, b: T) -> T {
        a + b
    }
}

/// Minimum.
pub struct MinOp<T>(PhantomData<T>);

impl<T: Serde + Ord + 'static> ReduceOp for MinOp<T> {
    type Value = T;

    fn combine(a: T, b: T) -> T {
        a.min(b)
    }
}

/// Maximum.
pub struct MaxOp<T>(PhantomData<T>);

impl<T: Serde + Ord + 'static> ReduceOp for MaxOp<T> {
    type Value = T;

    fn combine(a: T, b: T) -> T {
        a.max(b)
    }
}

/// Logical conjunction.
pub struct AndOp;

impl ReduceOp for AndOp {
    type Value = bool;

    fn combine(a: bool, b: bool) -> bool {
        a && b
    }
}

/// Logical disjunction.
pub struct OrOp;

impl ReduceOp for OrOp {
    type Value = bool;

    fn combine(a: bool, b: bool) -> bool {
        a || b
    }
}

pub(crate) type ReduceOpId = u32;

type CombineFn = Rc<dyn Fn(&[u8], &[u8]) -> Result<Vec<u8>, SerdeErr>>;

/// Dense registry of combiner operators, keyed by operator type.
pub(crate) struct ReduceKinds {
    combines: Vec<CombineFn>,
    by_type: HashMap<TypeId, ReduceOpId>,
}

impl ReduceKinds {
    pub fn new() -> Self {
        Self {
            combines: Vec::new(),
            by_type: HashMap::new(),
        }
    }

    pub fn register<O: ReduceOp>(&mut self) -> ReduceOpId {
        if let Some(id) = self.by_type.get(&TypeId::of::<O>()) {
            return *id;
        }
        let id = self.combines.len() as ReduceOpId;
        self.combines.push(Rc::new(|a, b| {
            let va = O::Value::from_bytes(a)?;
            let vb = O::Value::from_bytes(b)?;
            Ok(O::combine(va, vb).to_bytes())
        }));
        self.by_type.insert(TypeId::of::<O>(), id);
        id
    }

    pub fn id_of<O: ReduceOp>(&self) -> Option<ReduceOpId> {
        self.by_type.get(&TypeId::of::<O>()).copied()
    }

    pub fn combine(&self, op: ReduceOpId) -> Option<CombineFn> {
        self.combines.get(op as usize).cloned()
    }
}
