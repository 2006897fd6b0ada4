use nalgebra::Vector3;

pub type Fp = f64;
pub type Vec3f = Vector3<Fp>;

pub const FP_INF: Fp = Fp::INFINITY;

/// Offset used to push hit points off the surface and to reject hits at a ray's own origin.
pub static EPS: Fp = 0.0001;

#[derive(Clone, Debug)]
pub struct Ray {
    pub origin: Vec3f,
    pub direction: Vec3f,
}

impl Ray {
    /// `direction` must be non-zero; it is normalized here.
    pub fn new(origin: Vec3f, direction: Vec3f) -> Ray {
        Ray {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn at(&self, t: Fp) -> Vec3f {
        self.origin + self.direction * t
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Shape3D {
    Sphere { center: Vec3f, radius: Fp },
    Cube { min: Vec3f, max: Vec3f },
}

/// Mirror `ray` about `normal`.
pub fn get_reflection_ray(ray: &Vec3f, normal: &Vec3f) -> Vec3f {
    let projection = -ray.dot(normal);
    ray + normal * projection * 2.0
}

impl Shape3D {
    /// Nearest forward hit distance below `upper_bound`.
    pub fn intersect(&self, ray: &Ray, upper_bound: Fp) -> Option<Fp> {
        let t = match self {
            Shape3D::Sphere { center, radius } => intersect_sphere(ray, center, *radius),
            Shape3D::Cube { min, max } => intersect_cube(ray, min, max),
        }?;
        if t < upper_bound {
            Some(t)
        } else {
            None
        }
    }

    /// Unit outward normal, `point` is assumed to lie on the surface.
    pub fn normal_at(&self, point: &Vec3f) -> Vec3f {
        match self {
            Shape3D::Sphere { center, .. } => (point - center).normalize(),
            Shape3D::Cube { min, max } => {
                let distances = [
                    ((point.x - min.x).abs(), -Vec3f::x()),
                    ((point.x - max.x).abs(), Vec3f::x()),
                    ((point.y - min.y).abs(), -Vec3f::y()),
                    ((point.y - max.y).abs(), Vec3f::y()),
                    ((point.z - min.z).abs(), -Vec3f::z()),
                    ((point.z - max.z).abs(), Vec3f::z()),
                ];
                // first face wins on ties
                let mut best = distances[0];
                for candidate in &distances[1..] {
                    if candidate.0 < best.0 {
                        best = *candidate;
                    }
                }
                best.1
            }
        }
    }
}

fn intersect_sphere(ray: &Ray, center: &Vec3f, radius: Fp) -> Option<Fp> {
    let oc = ray.origin - center;
    let a = ray.direction.dot(&ray.direction);
    let b = 2.0 * oc.dot(&ray.direction);
    let c = oc.dot(&oc) - radius * radius;
    let discr = b * b - 4.0 * a * c;
    if discr < 0.0 {
        return None;
    }
    let t0 = (-b - discr.sqrt()) / (2.0 * a);
    let t1 = (-b + discr.sqrt()) / (2.0 * a);
    if t0 > EPS {
        Some(t0)
    } else if t1 > EPS {
        Some(t1)
    } else {
        None
    }
}

// Slab test. A zero direction component gives an infinite inverse, which the min/max below
// handle per IEEE-754.
fn intersect_cube(ray: &Ray, min: &Vec3f, max: &Vec3f) -> Option<Fp> {
    let inv_direction = ray.direction.map(|d| 1.0 / d);
    let t_min = (min - ray.origin).component_mul(&inv_direction);
    let t_max = (max - ray.origin).component_mul(&inv_direction);

    let t1 = t_min.zip_map(&t_max, Fp::min);
    let t2 = t_min.zip_map(&t_max, Fp::max);

    let t_near = Fp::max(t1.x, Fp::max(t1.y, t1.z));
    let t_far = Fp::min(t2.x, Fp::min(t2.y, t2.z));

    if t_near > t_far || t_far < EPS {
        None
    } else if t_near > EPS {
        Some(t_near)
    } else {
        Some(t_far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn unit_sphere() -> Shape3D {
        Shape3D::Sphere {
            center: Vec3f::zeros(),
            radius: 1.0,
        }
    }

    fn unit_cube() -> Shape3D {
        Shape3D::Cube {
            min: Vec3f::new(-1.0, -1.0, -1.0),
            max: Vec3f::new(1.0, 1.0, 1.0),
        }
    }

    #[test]
    fn ray_direction_is_normalized() {
        let ray = Ray::new(Vec3f::zeros(), Vec3f::new(3.0, 0.0, 4.0));
        assert_relative_eq!(ray.direction.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(ray.at(5.0), Vec3f::new(3.0, 0.0, 4.0), epsilon = 1e-12);
    }

    #[test]
    fn sphere_pierced_from_outside() {
        let ray = Ray::new(Vec3f::new(0.0, 0.0, 5.0), -Vec3f::z());
        let t = unit_sphere().intersect(&ray, FP_INF).unwrap();
        assert_abs_diff_eq!(t, 4.0, epsilon = 1e-3);
    }

    #[test]
    fn sphere_missed() {
        let ray = Ray::new(Vec3f::new(0.0, 2.0, 5.0), -Vec3f::z());
        assert_eq!(unit_sphere().intersect(&ray, FP_INF), None);
    }

    #[test]
    fn sphere_grazed() {
        let ray = Ray::new(Vec3f::new(0.0, 1.0, 5.0), -Vec3f::z());
        let t = unit_sphere().intersect(&ray, FP_INF).unwrap();
        assert_abs_diff_eq!(t, 5.0, epsilon = 1e-3);
    }

    #[test]
    fn sphere_from_inside_returns_far_root() {
        let ray = Ray::new(Vec3f::zeros(), Vec3f::x());
        let t = unit_sphere().intersect(&ray, FP_INF).unwrap();
        assert_abs_diff_eq!(t, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn sphere_behind_ray() {
        let ray = Ray::new(Vec3f::new(0.0, 0.0, 5.0), Vec3f::z());
        assert_eq!(unit_sphere().intersect(&ray, FP_INF), None);
    }

    #[test]
    fn upper_bound_cuts_off_far_hits() {
        let ray = Ray::new(Vec3f::new(0.0, 0.0, 5.0), -Vec3f::z());
        assert_eq!(unit_sphere().intersect(&ray, 3.0), None);
        assert!(unit_cube().intersect(&ray, 4.5).is_some());
        assert_eq!(unit_cube().intersect(&ray, 3.5), None);
    }

    #[test]
    fn sphere_normal_points_outward() {
        let normal = unit_sphere().normal_at(&Vec3f::new(0.0, 0.0, 1.0));
        assert_relative_eq!(normal, Vec3f::z());
    }

    #[test]
    fn cube_hit_from_outside_returns_entry() {
        let ray = Ray::new(Vec3f::new(0.0, 0.0, 5.0), -Vec3f::z());
        let t = unit_cube().intersect(&ray, FP_INF).unwrap();
        assert_abs_diff_eq!(t, 4.0, epsilon = 1e-3);
    }

    #[test]
    fn cube_hit_along_diagonal() {
        let ray = Ray::new(Vec3f::new(3.0, 3.0, 3.0), Vec3f::new(-1.0, -1.0, -1.0));
        let t = unit_cube().intersect(&ray, FP_INF).unwrap();
        assert_abs_diff_eq!(t, 2.0 * 3.0_f64.sqrt(), epsilon = 1e-3);
    }

    #[test]
    fn cube_missed_outside_single_slab() {
        // parallel to the x slab but outside it, axis-aligned direction has zero components
        let ray = Ray::new(Vec3f::new(2.0, 0.0, 5.0), -Vec3f::z());
        assert_eq!(unit_cube().intersect(&ray, FP_INF), None);
        let ray = Ray::new(Vec3f::new(0.0, -1.5, 5.0), Vec3f::new(0.1, 0.0, -1.0));
        assert_eq!(unit_cube().intersect(&ray, FP_INF), None);
    }

    #[test]
    fn cube_from_inside_returns_exit() {
        let ray = Ray::new(Vec3f::new(0.5, 0.0, 0.0), Vec3f::x());
        let t = unit_cube().intersect(&ray, FP_INF).unwrap();
        assert_abs_diff_eq!(t, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn cube_behind_ray() {
        let ray = Ray::new(Vec3f::new(0.0, 0.0, 5.0), Vec3f::z());
        assert_eq!(unit_cube().intersect(&ray, FP_INF), None);
    }

    #[test]
    fn cube_normals_follow_nearest_face() {
        let cube = unit_cube();
        assert_eq!(cube.normal_at(&Vec3f::new(-1.0, 0.2, 0.3)), -Vec3f::x());
        assert_eq!(cube.normal_at(&Vec3f::new(1.0, 0.2, 0.3)), Vec3f::x());
        assert_eq!(cube.normal_at(&Vec3f::new(0.1, -1.0, 0.3)), -Vec3f::y());
        assert_eq!(cube.normal_at(&Vec3f::new(0.1, 1.0, 0.3)), Vec3f::y());
        assert_eq!(cube.normal_at(&Vec3f::new(0.1, 0.2, -1.0)), -Vec3f::z());
        assert_eq!(cube.normal_at(&Vec3f::new(0.1, 0.2, 1.0)), Vec3f::z());
    }

    #[test]
    fn cube_normal_ties_prefer_x_faces() {
        // the corner is equally close to -X, -Y and -Z
        let normal = unit_cube().normal_at(&Vec3f::new(-1.0, -1.0, -1.0));
        assert_eq!(normal, -Vec3f::x());
    }

    #[test]
    fn reflection_mirrors_about_normal() {
        let reflected = get_reflection_ray(&Vec3f::new(1.0, -1.0, 0.0), &Vec3f::y());
        assert_relative_eq!(reflected, Vec3f::new(1.0, 1.0, 0.0));
    }
}
