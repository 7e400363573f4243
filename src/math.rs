//! Numerical helpers shared by the likelihood and summary code.

use num_traits::Float;

/**
Computes `ln(sum(exp(x_i)))` without overflow or underflow.

The running maximum is subtracted before exponentiating and added back at the
end. An empty slice, or one holding only `-inf`, yields `-inf`.

# Examples

```rust
use lot_mcmc::math::logsumexp;

let lse = logsumexp(&[-1000.0_f64, -1000.0]);
assert!((lse - (-1000.0 + 2.0_f64.ln())).abs() < 1e-12);
```
*/
pub fn logsumexp<T: Float>(xs: &[T]) -> T {
    let max = xs.iter().copied().fold(T::neg_infinity(), T::max);
    if max == T::neg_infinity() || max == T::infinity() {
        return max;
    }
    let sum = xs
        .iter()
        .map(|&x| (x - max).exp())
        .fold(T::zero(), |acc, x| acc + x);
    max + sum.ln()
}
