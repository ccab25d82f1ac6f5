//! Scalar values which form a computation graph
use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    iter::Sum,
    ops::{Add, Div, Mul, Neg, Sub},
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::backprop_fns::BackpropFunc;

type SharedValue = Rc<RefCell<InnerValue>>;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Returns whether operations on values currently record the computation graph
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|g| g.get())
}

/// Disables graph recording until the returned guard is dropped.
/// Analogous to `torch.no_grad()`.
pub fn no_grad() -> NoGradGuard {
    let prev = GRAD_ENABLED.with(|g| g.replace(false));
    NoGradGuard { prev }
}

/// Restores the previous gradient mode on drop
#[must_use = "gradient tracking is re-enabled as soon as the guard is dropped"]
pub struct NoGradGuard {
    prev: bool,
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|g| g.set(self.prev));
    }
}

/// Newtype representing a shared value in a computation graph
#[derive(Debug, Clone)]
pub struct Value(pub(crate) SharedValue);

impl Value {
    /// Create a new value, not derived from any other values
    pub fn new(data: f32) -> Self {
        Self(Rc::new(RefCell::new(InnerValue::new(data, None))))
    }

    /// Create a value derived from `operands`. With gradient tracking disabled the
    /// result is a plain leaf and holds no references to its operands.
    fn new_derived(data: f32, backprop_fn: BackpropFunc, operands: &[&Value]) -> Self {
        if !is_grad_enabled() {
            return Value::new(data);
        }
        let result = Self(Rc::new(RefCell::new(InnerValue::new(
            data,
            Some(backprop_fn),
        ))));
        {
            let mut inner = result.0.borrow_mut();
            inner.children.extend(operands.iter().map(|v| v.0.clone()));
        }
        result
    }

    pub fn data(&self) -> f32 {
        self.0.borrow().data
    }

    pub fn grad(&self) -> f32 {
        self.0.borrow().grad
    }

    /// Whether this value was produced by an operation that recorded its inputs
    pub fn is_leaf(&self) -> bool {
        self.0.borrow().children.is_empty()
    }

    /// A fresh leaf holding the same data, cut off from the graph
    pub fn detach(&self) -> Value {
        Value::new(self.data())
    }

    // Strictly, &mut isn't needed since the value is behind a shared mutable type,
    // but it indicates that the value should be excusively mutable
    pub fn set_data(&mut self, data: f32) {
        self.0.borrow_mut().data = data;
    }

    /// Unlike PyTorch which only zeros out the gradients of the leaf nodes, this zeros out
    /// all gradients in the computation graph which are children of this node
    pub fn zero_grad(&mut self) {
        self.0.borrow_mut().grad = 0.0;

        let mut order = vec![];
        let mut visited: HashSet<u64> = HashSet::new();
        self.topological_order(&mut order, &mut visited);
        for value in order.into_iter().rev() {
            value.0.borrow_mut().grad = 0.0;
        }
    }

    /// Accumulates `d self / d v` into every value `v` this one was computed from
    pub fn backward(&self) {
        // d out / d out = 1
        self.0.borrow_mut().grad = 1.0;

        let mut order = vec![];
        let mut visited: HashSet<u64> = HashSet::new();

        // post order, so reversing starts from the root
        self.topological_order(&mut order, &mut visited);

        for value in order.into_iter().rev() {
            let Some(f) = value.0.borrow().backprop_fn else {
                continue;
            };
            let operands = value
                .0
                .borrow()
                .children
                .iter()
                .map(|c| Value(c.clone()))
                .collect::<Vec<_>>();
            f.apply(&operands, &value);
        }
    }

    fn topological_order(&self, order: &mut Vec<Value>, visited: &mut HashSet<u64>) {
        for c in self.0.borrow().children.iter() {
            if !visited.insert(c.borrow().id) {
                continue;
            }
            Value(c.clone()).topological_order(order, visited);
        }
        order.push(self.clone());
    }
}

// Various operations on values
impl Value {
    pub fn pow(&self, other: &Value) -> Value {
        Value::new_derived(
            self.data().powf(other.data()),
            BackpropFunc::Pow,
            &[self, other],
        )
    }

    pub fn relu(&self) -> Value {
        Value::new_derived(self.data().max(0.0), BackpropFunc::ReLU, &[self])
    }

    pub fn exp(&self) -> Value {
        Value::new_derived(self.data().exp(), BackpropFunc::Exp, &[self])
    }

    /// Natural logarithm
    pub fn ln(&self) -> Value {
        Value::new_derived(self.data().ln(), BackpropFunc::Ln, &[self])
    }
}

impl Add for &Value {
    type Output = Value;

    fn add(self, other: &Value) -> Value {
        Value::new_derived(self.data() + other.data(), BackpropFunc::Add, &[self, other])
    }
}

impl Sub for &Value {
    type Output = Value;

    fn sub(self, other: &Value) -> Value {
        Value::new_derived(self.data() - other.data(), BackpropFunc::Sub, &[self, other])
    }
}

impl Mul for &Value {
    type Output = Value;

    fn mul(self, other: &Value) -> Value {
        Value::new_derived(self.data() * other.data(), BackpropFunc::Mul, &[self, other])
    }
}

impl Div for &Value {
    type Output = Value;

    fn div(self, other: &Value) -> Value {
        let data = if other.data().is_nan() {
            0.0
        } else {
            self.data() / other.data()
        };
        Value::new_derived(data, BackpropFunc::Div, &[self, other])
    }
}

impl Neg for &Value {
    type Output = Value;

    fn neg(self) -> Value {
        Value::new_derived(-self.data(), BackpropFunc::Neg, &[self])
    }
}

impl Sum for Value {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Value::new(0.0), |acc, v| acc + v)
    }
}

/// Convenience macro to implement operations on `[Value]` when ownership can be transferred
macro_rules! impl_arithmetic(
    ($trait:ident, $trait_method:ident, $operator:tt, $struct:ident) => {
        impl $trait for $struct {
            type Output = Self;

            fn $trait_method(self, other: Self) -> Self {
                &self $operator &other
            }
        }
    }
);
impl_arithmetic!(Add, add, +, Value);
impl_arithmetic!(Sub, sub, -, Value);
impl_arithmetic!(Mul, mul, *, Value);
impl_arithmetic!(Div, div, /, Value);

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for Value {}

impl AsRef<Value> for Value {
    fn as_ref(&self) -> &Value {
        self
    }
}

impl From<f32> for Value {
    fn from(data: f32) -> Self {
        Value::new(data)
    }
}

#[derive(Debug)]
pub(crate) struct InnerValue {
    pub(crate) data: f32,
    /// gradient of the value with respect to the output
    pub(crate) grad: f32,
    /// Inputs of the forward operation, "children" in the backwards pass
    children: Vec<SharedValue>,
    id: u64,
    /// `None` for leaf nodes
    pub(crate) backprop_fn: Option<BackpropFunc>,
}

impl InnerValue {
    pub fn new(data: f32, backprop_fn: Option<BackpropFunc>) -> Self {
        Self {
            data,
            grad: 0.0,
            children: vec![],
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            backprop_fn,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[macro_export]
    macro_rules! assert_eq_float {
        ($a:expr, $b:expr) => {
            assert!((($a) - ($b)).abs() < 1e-5, "{} != {}", $a, $b);
        };
    }

    #[test]
    fn test_add_mul() {
        let a = Value::new(2.0);
        let b = Value::new(3.0);

        let c = &(&a + &b) * &a;
        assert_eq!(c.data(), 10.0);
        c.backward();

        // dc/da = 2a + b
        // dc/db = a
        assert_eq!(a.grad(), 7.0);
        assert_eq!(b.grad(), 2.0);
    }

    #[test]
    fn test_div() {
        let a = Value::new(2.0);
        let b = Value::new(3.0);

        let c = &a / &b;
        assert_eq_float!(c.data(), 2.0 / 3.0);

        c.backward();

        // dc/da = 1/b
        // dc/db = -a/b^2
        assert_eq_float!(a.grad(), 1.0 / 3.0);
        assert_eq_float!(b.grad(), -2.0 / 9.0);
    }

    #[test]
    fn test_ln() {
        let a = Value::new(2.0);
        let b = a.ln();
        assert_eq_float!(b.data(), 2.0f32.ln());

        b.backward();

        // d ln(a) / da = 1/a
        assert_eq_float!(a.grad(), 0.5);
    }

    #[test]
    fn test_exp_relu_neg() {
        let a = Value::new(-1.0);
        let z = (-&a).exp().relu();
        assert_eq_float!(z.data(), 1.0f32.exp());

        z.backward();

        // dz/da = -exp(-a)
        assert_eq_float!(a.grad(), -(1.0f32.exp()));
    }

    #[test]
    fn test_no_grad_builds_no_graph() {
        let a = Value::new(2.0);
        let b = Value::new(3.0);
        {
            let _guard = no_grad();
            assert!(!is_grad_enabled());
            let c = &a * &b;
            assert_eq!(c.data(), 6.0);
            assert!(c.is_leaf());
            c.backward();
        }
        assert!(is_grad_enabled());
        assert_eq!(a.grad(), 0.0);
        assert_eq!(b.grad(), 0.0);

        let c = &a * &b;
        assert!(!c.is_leaf());
    }

    #[test]
    fn test_nested_no_grad_restores_outer_mode() {
        let outer = no_grad();
        {
            let _inner = no_grad();
        }
        assert!(!is_grad_enabled());
        drop(outer);
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_zero_grad_clears_graph() {
        let a = Value::new(2.0);
        let b = Value::new(3.0);
        let mut c = &a * &b;
        c.backward();
        assert_eq!(a.grad(), 3.0);
        c.zero_grad();
        assert_eq!(a.grad(), 0.0);
        assert_eq!(b.grad(), 0.0);
        assert_eq!(c.grad(), 0.0);
    }
}
