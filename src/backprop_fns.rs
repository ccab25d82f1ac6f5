//! Local gradient rules for backprop
//!
//! Each variant corresponds to a node in the computation graph. Applying it pushes the
//! node's accumulated gradient onto its operands with the chain rule.

use crate::values::Value;

/// Represents the function in the computation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpropFunc {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Pow,
    ReLU,
    Exp,
    Ln,
}

impl BackpropFunc {
    pub fn n_operands(&self) -> usize {
        match self {
            BackpropFunc::Add
            | BackpropFunc::Sub
            | BackpropFunc::Mul
            | BackpropFunc::Div
            | BackpropFunc::Pow => 2,
            BackpropFunc::Neg | BackpropFunc::ReLU | BackpropFunc::Exp | BackpropFunc::Ln => 1,
        }
    }

    /// Partial derivatives of `out` with respect to each operand, evaluated at the
    /// operands' current data
    fn local_grads(&self, operands: &[f32], out: f32) -> [f32; 2] {
        match (self, operands) {
            (BackpropFunc::Add, _) => [1.0, 1.0],
            (BackpropFunc::Sub, _) => [1.0, -1.0],
            (BackpropFunc::Mul, [a, b]) => [*b, *a],
            (BackpropFunc::Div, [a, b]) => [1.0 / b, -a / b.powf(2.0)],
            // d a^b / db is only defined for positive a, the exponent is treated as constant
            (BackpropFunc::Pow, [a, b]) => [b * a.powf(b - 1.0), 0.0],
            (BackpropFunc::Neg, _) => [-1.0, 0.0],
            (BackpropFunc::ReLU, [a]) => [if *a > 0.0 { 1.0 } else { 0.0 }, 0.0],
            (BackpropFunc::Exp, _) => [out, 0.0],
            (BackpropFunc::Ln, [a]) => [1.0 / a, 0.0],
            _ => unreachable!("{:?} applied to {} operands", self, operands.len()),
        }
    }

    /// Accumulates the gradient of `out` into `operands`
    pub fn apply(&self, operands: &[Value], out: &Value) {
        assert_eq!(
            operands.len(),
            self.n_operands(),
            "Invalid number of operands for {:?}",
            self
        );
        let (out_data, out_grad) = {
            let inner = out.0.borrow();
            (inner.data, inner.grad)
        };
        let data = operands.iter().map(|v| v.data()).collect::<Vec<_>>();
        let local = self.local_grads(&data, out_data);
        for (operand, d) in operands.iter().zip(local) {
            operand.0.borrow_mut().grad += d * out_grad;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_float;

    #[test]
    fn test_pow_ignores_exponent_grad() {
        let a = Value::new(3.0);
        let b = Value::new(2.0);
        let c = a.pow(&b);
        c.backward();
        assert_eq_float!(a.grad(), 6.0);
        assert_eq!(b.grad(), 0.0);
    }

    #[test]
    fn test_relu_blocks_negative() {
        let a = Value::new(-2.0);
        let z = a.relu();
        z.backward();
        assert_eq!(z.data(), 0.0);
        assert_eq!(a.grad(), 0.0);
    }

    #[test]
    fn test_apply_accumulates() {
        let a = Value::new(2.0);
        let b = Value::new(5.0);
        let out = &a - &b;
        out.backward();
        out.backward();
        assert_eq!(a.grad(), 2.0);
        assert_eq!(b.grad(), -2.0);
    }
}
