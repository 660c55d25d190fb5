//! Numeric unitary primitive.
//!
//! Validates small complex matrices as unitary and provides the 2x2 algebra
//! used to raise single-qubit gates to fractional powers: axis-angle power
//! followed by a ZYZ re-decomposition into `u(θ, φ, λ)` angles.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::{IrError, IrResult};

/// Tolerance for internal floating point comparisons.
const EPSILON: f64 = 1e-10;

/// Check whether a row-major `dim x dim` matrix is unitary, i.e. `U†U = I`
/// with every entry within `tolerance`.
pub fn is_unitary(data: &[Complex64], dim: usize, tolerance: f64) -> IrResult<bool> {
    if data.len() != dim * dim {
        return Err(IrError::MatrixShape {
            expected: dim * dim,
            got: data.len(),
        });
    }
    for row in 0..dim {
        for col in 0..dim {
            let entry: Complex64 = (0..dim)
                .map(|k| data[k * dim + row].conj() * data[k * dim + col])
                .sum();
            let expected = if row == col { 1.0 } else { 0.0 };
            if (entry - Complex64::new(expected, 0.0)).norm() > tolerance {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// A 2x2 complex matrix in row-major order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unitary2x2 {
    /// The matrix elements in row-major order: [[a, b], [c, d]].
    pub data: [Complex64; 4],
}

impl Unitary2x2 {
    /// Create a new 2x2 matrix.
    pub fn new(a: Complex64, b: Complex64, c: Complex64, d: Complex64) -> Self {
        Self { data: [a, b, c, d] }
    }

    /// Create the identity matrix.
    pub fn identity() -> Self {
        Self::diagonal(Complex64::new(1.0, 0.0), Complex64::new(1.0, 0.0))
    }

    fn diagonal(a: Complex64, d: Complex64) -> Self {
        let zero = Complex64::new(0.0, 0.0);
        Self::new(a, zero, zero, d)
    }

    /// Hadamard.
    pub fn h() -> Self {
        let s = Complex64::new(1.0 / 2.0_f64.sqrt(), 0.0);
        Self::new(s, s, s, -s)
    }

    /// Pauli-X.
    pub fn x() -> Self {
        let zero = Complex64::new(0.0, 0.0);
        let one = Complex64::new(1.0, 0.0);
        Self::new(zero, one, one, zero)
    }

    /// Pauli-Y.
    pub fn y() -> Self {
        let zero = Complex64::new(0.0, 0.0);
        let i = Complex64::new(0.0, 1.0);
        Self::new(zero, -i, i, zero)
    }

    /// Pauli-Z.
    pub fn z() -> Self {
        Self::p(PI)
    }

    /// sqrt(X).
    pub fn sx() -> Self {
        let half = Complex64::new(0.5, 0.0);
        let half_i = Complex64::new(0.0, 0.5);
        Self::new(half + half_i, half - half_i, half - half_i, half + half_i)
    }

    /// sqrt(X)-dagger.
    pub fn sxdg() -> Self {
        Self::sx().dagger()
    }

    /// X rotation.
    pub fn rx(theta: f64) -> Self {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new(0.0, -(theta / 2.0).sin());
        Self::new(c, s, s, c)
    }

    /// Y rotation.
    pub fn ry(theta: f64) -> Self {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new((theta / 2.0).sin(), 0.0);
        Self::new(c, -s, s, c)
    }

    /// Z rotation.
    pub fn rz(theta: f64) -> Self {
        Self::diagonal(
            Complex64::from_polar(1.0, -theta / 2.0),
            Complex64::from_polar(1.0, theta / 2.0),
        )
    }

    /// Phase gate P(λ).
    pub fn p(lambda: f64) -> Self {
        Self::diagonal(Complex64::new(1.0, 0.0), Complex64::from_polar(1.0, lambda))
    }

    /// Universal single-qubit gate U(θ, φ, λ).
    pub fn u(theta: f64, phi: f64, lambda: f64) -> Self {
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        Self::new(
            Complex64::new(c, 0.0),
            -Complex64::from_polar(s, lambda),
            Complex64::from_polar(s, phi),
            Complex64::from_polar(c, phi + lambda),
        )
    }

    /// Matrix product `self * other`.
    #[allow(clippy::many_single_char_names)]
    pub fn mul(&self, other: &Self) -> Self {
        let [a, b, c, d] = self.data;
        let [e, f, g, h] = other.data;
        Self::new(a * e + b * g, a * f + b * h, c * e + d * g, c * f + d * h)
    }

    /// Conjugate transpose.
    pub fn dagger(&self) -> Self {
        Self::new(
            self.data[0].conj(),
            self.data[2].conj(),
            self.data[1].conj(),
            self.data[3].conj(),
        )
    }

    fn scale(&self, factor: Complex64) -> Self {
        let [a, b, c, d] = self.data;
        Self::new(a * factor, b * factor, c * factor, d * factor)
    }

    /// Unitary check within `tolerance`.
    pub fn is_unitary(&self, tolerance: f64) -> bool {
        is_unitary(&self.data, 2, tolerance).unwrap_or(false)
    }

    /// Compare two matrices while ignoring a global phase.
    pub fn equal_up_to_phase(&self, other: &Self, tolerance: f64) -> bool {
        let Some(pivot) = (0..4).max_by(|&i, &j| {
            other.data[i]
                .norm()
                .total_cmp(&other.data[j].norm())
        }) else {
            return false;
        };
        if other.data[pivot].norm() < EPSILON {
            return false;
        }
        let phase = self.data[pivot] / other.data[pivot];
        if (phase.norm() - 1.0).abs() > tolerance {
            return false;
        }
        self.data
            .iter()
            .zip(other.data.iter())
            .all(|(a, b)| (a - b * phase).norm() <= tolerance)
    }

    /// Raise the matrix to a real power through its axis-angle form.
    ///
    /// The matrix is split into `e^{iδ} V` with `V` in SU(2), written as
    /// `V = cos(a) I - i sin(a) (n·σ)`, and the power is taken on `a` and `δ`.
    /// Fails if the matrix is not unitary within `tolerance`.
    pub fn power(&self, exponent: f64, tolerance: f64) -> IrResult<Self> {
        if !self.is_unitary(tolerance) {
            return Err(IrError::NonUnitary { tolerance });
        }
        let [a, b, c, d] = self.data;
        let delta = (a * d - b * c).arg() / 2.0;
        let v = self.scale(Complex64::from_polar(1.0, -delta));

        let cos_a = ((v.data[0] + v.data[3]) / 2.0).re.clamp(-1.0, 1.0);
        let angle = cos_a.acos();
        let sin_a = angle.sin();
        let generator = if sin_a.abs() < EPSILON {
            Self::z()
        } else {
            let shifted = Self::new(
                v.data[0] - cos_a,
                v.data[1],
                v.data[2],
                v.data[3] - cos_a,
            );
            shifted.scale(Complex64::new(0.0, 1.0 / sin_a))
        };

        let new_angle = angle * exponent;
        let cos_part = Self::identity().scale(Complex64::new(new_angle.cos(), 0.0));
        let sin_part = generator.scale(Complex64::new(0.0, -new_angle.sin()));
        let powered = Self::new(
            cos_part.data[0] + sin_part.data[0],
            cos_part.data[1] + sin_part.data[1],
            cos_part.data[2] + sin_part.data[2],
            cos_part.data[3] + sin_part.data[3],
        );
        Ok(powered.scale(Complex64::from_polar(1.0, delta * exponent)))
    }

    /// Decompose into RZ(alpha) * RY(beta) * RZ(gamma) * `global_phase`.
    ///
    /// Returns (alpha, beta, gamma, `global_phase`).
    pub fn zyz_decomposition(&self) -> (f64, f64, f64, f64) {
        let [a, b, c, d] = self.data;

        let det = a * d - b * c;
        let global_phase = det.arg() / 2.0;

        // Remove global phase to get an SU(2) matrix
        let phase_factor = Complex64::from_polar(1.0, -global_phase);
        let a = a * phase_factor;
        let b = b * phase_factor;
        let c = c * phase_factor;

        let beta = 2.0 * a.norm().clamp(0.0, 1.0).acos();

        if beta.abs() < EPSILON {
            let alpha_plus_gamma = -2.0 * a.arg();
            return (
                alpha_plus_gamma / 2.0,
                0.0,
                alpha_plus_gamma / 2.0,
                global_phase,
            );
        }

        if (beta - PI).abs() < EPSILON {
            let alpha_minus_gamma = -2.0 * (-b).arg();
            return (
                alpha_minus_gamma / 2.0,
                PI,
                -alpha_minus_gamma / 2.0,
                global_phase,
            );
        }

        // a = cos(beta/2) * e^(-i*(alpha+gamma)/2)
        // c = sin(beta/2) * e^(i*(alpha-gamma)/2)
        let alpha_plus_gamma = -2.0 * a.arg();
        let alpha_minus_gamma = 2.0 * c.arg();

        let alpha = f64::midpoint(alpha_plus_gamma, alpha_minus_gamma);
        let gamma = (alpha_plus_gamma - alpha_minus_gamma) / 2.0;

        (alpha, beta, gamma, global_phase)
    }

    /// Angles `(θ, φ, λ)` such that `u(θ, φ, λ)` equals this matrix up to
    /// global phase.
    pub fn u_angles(&self) -> (f64, f64, f64) {
        let (alpha, beta, gamma, _) = self.zyz_decomposition();
        (
            beta,
            normalize_angle(alpha),
            normalize_angle(gamma),
        )
    }
}

/// Normalize an angle to [-π, π].
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let mut a = angle.rem_euclid(2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    }
    a
}

impl Default for Unitary2x2 {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Unitary2x2 {
    type Output = Self;

    #[allow(clippy::needless_pass_by_value)]
    fn mul(self, rhs: Self) -> Self::Output {
        Unitary2x2::mul(&self, &rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-8;

    #[test]
    fn test_builtin_matrices_are_unitary() {
        for m in [
            Unitary2x2::h(),
            Unitary2x2::x(),
            Unitary2x2::y(),
            Unitary2x2::z(),
            Unitary2x2::sx(),
            Unitary2x2::rx(0.3),
            Unitary2x2::u(0.1, 0.2, 0.3),
        ] {
            assert!(m.is_unitary(TOL), "{m:?}");
        }
    }

    #[test]
    fn test_non_unitary_rejected() {
        let one = Complex64::new(1.0, 0.0);
        let m = Unitary2x2::new(one, one, one, one);
        assert!(!m.is_unitary(TOL));
        assert!(matches!(m.power(0.5, TOL), Err(IrError::NonUnitary { .. })));
    }

    #[test]
    fn test_shape_check() {
        let data = vec![Complex64::new(1.0, 0.0); 3];
        assert!(matches!(
            is_unitary(&data, 2, TOL),
            Err(IrError::MatrixShape { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn test_borderline_tolerance() {
        let eps = Complex64::new(1e-6, 0.0);
        let mut m = Unitary2x2::identity();
        m.data[1] = eps;
        assert!(!m.is_unitary(1e-8));
        assert!(m.is_unitary(1e-4));
    }

    #[test]
    fn test_sqrt_x_squares_to_x() {
        let root = Unitary2x2::x().power(0.5, TOL).unwrap();
        assert!((root * root).equal_up_to_phase(&Unitary2x2::x(), 1e-9));
        assert!(root.equal_up_to_phase(&Unitary2x2::sx(), 1e-9));
    }

    #[test]
    fn test_power_of_rotation_scales_angle() {
        let m = Unitary2x2::rz(0.8).power(0.5, TOL).unwrap();
        assert!(m.equal_up_to_phase(&Unitary2x2::rz(0.4), 1e-9));
    }

    #[test]
    fn test_identity_power() {
        let m = Unitary2x2::identity().power(0.3, TOL).unwrap();
        assert!(m.equal_up_to_phase(&Unitary2x2::identity(), 1e-9));
    }

    #[test]
    fn test_u_angles_reconstruct() {
        for m in [
            Unitary2x2::h(),
            Unitary2x2::x(),
            Unitary2x2::y(),
            Unitary2x2::sx(),
            Unitary2x2::p(0.7),
            Unitary2x2::u(1.1, -0.4, 2.5),
        ] {
            let (theta, phi, lambda) = m.u_angles();
            let rebuilt = Unitary2x2::u(theta, phi, lambda);
            assert!(rebuilt.equal_up_to_phase(&m, 1e-9), "{m:?} vs {rebuilt:?}");
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_u_angles_reconstruct(
            theta in 0.0_f64..PI,
            phi in -PI..PI,
            lambda in -PI..PI,
        ) {
            let m = Unitary2x2::u(theta, phi, lambda);
            let (t, p, l) = m.u_angles();
            proptest::prop_assert!(Unitary2x2::u(t, p, l).equal_up_to_phase(&m, 1e-7));
        }

        #[test]
        fn prop_square_root_squares_back(
            theta in 0.0_f64..PI,
            phi in -PI..PI,
            lambda in -PI..PI,
        ) {
            let m = Unitary2x2::u(theta, phi, lambda);
            let root = m.power(0.5, TOL).unwrap();
            proptest::prop_assert!((root * root).equal_up_to_phase(&m, 1e-7));
        }
    }

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert_eq!(normalize_angle(f64::NAN), 0.0);
    }
}
