use rand::Rng;

use crate::geometry::{Fp, Vec3f};

pub trait SampleDistribution {
    fn sample(&self, rng: &mut impl Rng, normal: &Vec3f) -> Vec3f;
    #[cfg(test)]
    fn pdf(&self, normal: &Vec3f, direction: &Vec3f) -> Fp;
}

/// Uniform directions over the hemisphere around `normal`.
pub struct SemisphereUniform;

impl SampleDistribution for SemisphereUniform {
    fn sample(&self, rng: &mut impl Rng, normal: &Vec3f) -> Vec3f {
        let theta = 2.0 * std::f64::consts::PI * rng.gen::<Fp>();
        let phi = (2.0 * rng.gen::<Fp>() - 1.0).acos();
        let result = Vec3f::new(
            phi.sin() * theta.cos(),
            phi.sin() * theta.sin(),
            phi.cos(),
        );
        if result.dot(normal) < 0.0 {
            -result.normalize()
        } else {
            result.normalize()
        }
    }

    #[cfg(test)]
    fn pdf(&self, normal: &Vec3f, direction: &Vec3f) -> Fp {
        if direction.dot(normal) >= 0.0 {
            1.0 / (2.0 * std::f64::consts::PI)
        } else {
            0.0
        }
    }
}
