//! Optimizer(s)

use crate::values::Value;

/// Learning rate used when no optimizer is supplied to `fit`
pub const DEFAULT_LR: f32 = 0.001;
/// Momentum used when no optimizer is supplied to `fit`
pub const DEFAULT_MOMENTUM: f32 = 0.9;

/// Common interface for optimizers
/// Analogous to the torch.optim.Optimizer interface
/// <https://pytorch.org/docs/stable/optim.html#base-class>
pub trait Optim {
    /// Performs a single optimization step with accumulated gradients
    fn step(&mut self);
    /// Zeros gradients for all parameters
    fn zero_grad(&mut self);
}

impl<O: Optim + ?Sized> Optim for Box<O> {
    fn step(&mut self) {
        (**self).step();
    }

    fn zero_grad(&mut self) {
        (**self).zero_grad();
    }
}

/// SGD with momentum
pub struct SGD {
    params: Vec<Value>,
    // constant learning rate, no decay schedule
    lr: f32,
    momentum: f32,
    // velocity per parameter
    velocity: Vec<f32>,
}

impl SGD {
    pub fn new(params: Vec<Value>, lr: f32, momentum: f32) -> Self {
        let velocity = vec![0.0; params.len()];
        Self {
            params,
            lr,
            momentum,
            velocity,
        }
    }

    /// Returns a constructor which binds the hyperparameters and waits for the model
    /// parameters, the shape `fit` expects for its optimizer argument
    pub fn factory(lr: f32, momentum: f32) -> impl FnOnce(Vec<Value>) -> SGD {
        move |params| SGD::new(params, lr, momentum)
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    #[cfg(test)]
    fn velocities(&self) -> &[f32] {
        &self.velocity
    }
}

impl Optim for SGD {
    fn step(&mut self) {
        for (param, velocity) in self.params.iter_mut().zip(self.velocity.iter_mut()) {
            *velocity = self.momentum * *velocity - self.lr * param.grad();
            let new_val = param.data() + *velocity;
            param.set_data(new_val);
        }
    }

    fn zero_grad(&mut self) {
        for param in self.params.iter_mut() {
            param.zero_grad();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_float;

    #[test]
    fn test_sgd_no_momentum() {
        let a = Value::new(1.0);
        let b = Value::new(2.0);
        let c = &a * &b;
        c.backward();

        let mut optim = SGD::factory(0.1, 0.0)(vec![a.clone(), b.clone()]);
        optim.step();
        // da = b, db = a
        assert_eq_float!(a.data(), 0.8);
        assert_eq_float!(b.data(), 1.9);
    }

    #[test]
    fn test_sgd_with_momentum() {
        let a = Value::new(1.0);
        let b = Value::new(2.0);
        let c = &a + &b;
        c.backward();

        let mut optim = SGD::new(vec![a.clone(), b.clone()], 0.1, 0.9);
        optim.step();
        assert_eq_float!(a.data(), 0.9);
        assert_eq_float!(b.data(), 1.9);
        assert_eq!(optim.velocities(), &[-0.1, -0.1]);
        optim.step();
        assert_eq_float!(a.data(), 0.71);
        assert_eq_float!(b.data(), 1.71);
        assert_eq_float!(optim.velocities()[0], -0.19);
    }

    #[test]
    fn test_zero_grad_through_box() {
        let a = Value::new(1.0);
        let c = &a * &Value::new(4.0);
        c.backward();
        assert_eq!(a.grad(), 4.0);

        let mut optim: Box<dyn Optim> = Box::new(SGD::new(vec![a.clone()], 0.1, 0.0));
        optim.zero_grad();
        assert_eq!(a.grad(), 0.0);
    }
}
