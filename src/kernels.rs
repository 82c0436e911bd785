// SPH smoothing kernels, split into constant / variable parts so the
// normalization can be cached in SimulationParameters and only the shape
// term is evaluated per neighbor pair.
use std::f32::consts::PI;

/// M4 cubic spline on the coarse support r <= 2h, dimensionless form used by
/// the weighted-volume estimator.
pub struct KernelM4;

impl KernelM4 {
    #[inline]
    pub fn constant(_h: f32) -> f32 {
        8.0 / PI
    }

    #[inline]
    pub fn variable(h: f32, r: f32) -> f32 {
        let q = r / (2.0 * h);
        if !(0.0..=1.0).contains(&q) {
            return 0.0;
        }
        if q <= 0.5 {
            1.0 - 6.0 * q * q + 6.0 * q * q * q
        } else {
            let tmp = 1.0 - q;
            2.0 * tmp * tmp * tmp
        }
    }

    #[inline]
    pub fn evaluate(h: f32, r: f32) -> f32 {
        Self::constant(h) * Self::variable(h, r)
    }
}

/// Poly6 density kernel, support r <= h.
pub struct KernelPoly6;

impl KernelPoly6 {
    #[inline]
    pub fn constant(h: f32) -> f32 {
        315.0 / (64.0 * PI * h.powi(9))
    }

    #[inline]
    pub fn variable(h: f32, r: f32) -> f32 {
        if !(0.0..=1.0).contains(&(r / h)) {
            return 0.0;
        }
        let tmp = h * h - r * r;
        tmp * tmp * tmp
    }

    #[inline]
    pub fn evaluate(h: f32, r: f32) -> f32 {
        Self::constant(h) * Self::variable(h, r)
    }
}

/// Spiky kernel, only its gradient is used (pressure force), support r <= h.
pub struct KernelSpiky;

impl KernelSpiky {
    #[inline]
    pub fn gradient_constant(h: f32) -> f32 {
        -45.0 / (PI * h.powi(6))
    }

    #[inline]
    pub fn gradient_variable(h: f32, r: f32) -> f32 {
        if r < 0.0 || r > h {
            return 0.0;
        }
        let tmp = h - r;
        tmp * tmp
    }

    #[inline]
    pub fn gradient(h: f32, r: f32) -> f32 {
        Self::gradient_constant(h) * Self::gradient_variable(h, r)
    }
}

/// Viscosity kernel, only its laplacian is used (viscous diffusion),
/// support r <= h.
pub struct KernelViscosity;

impl KernelViscosity {
    #[inline]
    pub fn laplacian_constant(h: f32) -> f32 {
        45.0 / (PI * h.powi(6))
    }

    #[inline]
    pub fn laplacian_variable(h: f32, r: f32) -> f32 {
        if r < 0.0 || r > h {
            return 0.0;
        }
        h - r
    }

    #[inline]
    pub fn laplacian(h: f32, r: f32) -> f32 {
        Self::laplacian_constant(h) * Self::laplacian_variable(h, r)
    }
}

/// Refined cubic spline kernel/gradient pair, support r <= 2h, piecewise in
/// q = r/h.
pub struct KernelCubicSpline;

impl KernelCubicSpline {
    #[inline]
    pub fn constant(h: f32) -> f32 {
        1.0 / (4.0 * PI * h.powi(3))
    }

    #[inline]
    pub fn variable(h: f32, r: f32) -> f32 {
        let q = r / h;
        if !(0.0..2.0).contains(&q) {
            return 0.0;
        }
        let tmp = 2.0 - q;
        let tmp2 = 1.0 - q;
        if q < 1.0 {
            tmp.powi(3) - 4.0 * tmp2.powi(3)
        } else {
            tmp.powi(3)
        }
    }

    #[inline]
    pub fn evaluate(h: f32, r: f32) -> f32 {
        Self::constant(h) * Self::variable(h, r)
    }

    #[inline]
    pub fn gradient_constant(h: f32) -> f32 {
        1.0 / (4.0 * PI * h.powi(4))
    }

    #[inline]
    pub fn gradient_variable(h: f32, r: f32) -> f32 {
        let q = r / h;
        if !(0.0..2.0).contains(&q) {
            return 0.0;
        }
        let tmp = 2.0 - q;
        let tmp2 = 1.0 - q;
        if q < 1.0 {
            -3.0 * tmp * tmp + 12.0 * tmp2 * tmp2
        } else {
            -3.0 * tmp * tmp
        }
    }

    #[inline]
    pub fn gradient(h: f32, r: f32) -> f32 {
        Self::gradient_constant(h) * Self::gradient_variable(h, r)
    }
}
