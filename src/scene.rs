use rand::Rng;
use thiserror::Error;

use crate::distributions::{SampleDistribution, SemisphereUniform};
use crate::geometry::{get_reflection_ray, Fp, Ray, Shape3D, Vec3f, EPS, FP_INF};
use crate::settings::RenderSettings;

const SPECULAR_EXPONENT: i32 = 20;
const ROULETTE_DEPTH: u32 = 2;
const ROULETTE_SURVIVAL: Fp = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub color: Vec3f,
    pub diffuse: Fp,
    pub specular: Fp,
    /// Weight of the indirect (bounced) radiance.
    pub reflection: Fp,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            color: Vec3f::new(1.0, 1.0, 1.0),
            diffuse: 0.7,
            specular: 0.3,
            reflection: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
    pub shape: Shape3D,
    pub material: Material,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub primitives: Vec<Primitive>,
    /// Point lights of unit intensity and infinite range.
    pub lights: Vec<Vec3f>,
}

pub struct Hit<'a> {
    pub offset: Fp,
    pub primitive: &'a Primitive,
}

impl Scene {
    /// Red sphere and green cube lit by two lights above the camera.
    pub fn default_scene() -> Scene {
        Scene {
            primitives: vec![
                Primitive {
                    shape: Shape3D::Sphere {
                        center: Vec3f::new(0.0, 0.0, -5.0),
                        radius: 1.0,
                    },
                    material: Material {
                        color: Vec3f::new(1.0, 0.2, 0.2),
                        ..Default::default()
                    },
                },
                Primitive {
                    shape: Shape3D::Cube {
                        min: Vec3f::new(-2.0, -2.0, -7.0),
                        max: Vec3f::new(-1.0, -1.0, -6.0),
                    },
                    material: Material {
                        color: Vec3f::new(0.2, 1.0, 0.2),
                        ..Default::default()
                    },
                },
            ],
            lights: vec![Vec3f::new(5.0, 5.0, 5.0), Vec3f::new(-5.0, 5.0, 5.0)],
        }
    }

    pub fn closest_hit(&self, ray: &Ray) -> Option<Hit<'_>> {
        let mut closest: Option<Hit> = None;
        for primitive in &self.primitives {
            let upper_bound = closest.as_ref().map_or(FP_INF, |hit| hit.offset);
            if let Some(offset) = primitive.shape.intersect(ray, upper_bound) {
                closest = Some(Hit { offset, primitive });
            }
        }
        closest
    }

    /// Whether anything blocks `ray` before `distance`.
    pub fn is_occluded(&self, ray: &Ray, distance: Fp) -> bool {
        self.primitives
            .iter()
            .any(|primitive| primitive.shape.intersect(ray, distance).is_some())
    }

    /// Radiance arriving along `ray`.
    ///
    /// Past depth 2 half of the paths are dropped without reweighting the survivors, so deep
    /// bounces lose energy compared to an unbiased estimator.
    pub fn trace(
        &self,
        ray: &Ray,
        depth: u32,
        settings: &RenderSettings,
        rng: &mut impl Rng,
    ) -> Vec3f {
        if depth > ROULETTE_DEPTH && rng.gen::<Fp>() > ROULETTE_SURVIVAL {
            return Vec3f::zeros();
        }
        if depth >= settings.max_depth {
            return Vec3f::zeros();
        }
        let Some(hit) = self.closest_hit(ray) else {
            return Vec3f::zeros();
        };

        let point = ray.at(hit.offset);
        let normal = hit.primitive.shape.normal_at(&point);
        let material = &hit.primitive.material;
        let surface_point = point + normal * EPS;

        let mut color = self.direct_light(ray, &point, &surface_point, &normal, material);

        if depth < settings.max_depth && settings.samples > 0 {
            let weight = material.reflection / settings.samples as Fp;
            for _ in 0..settings.samples {
                let direction = SemisphereUniform.sample(rng, &normal);
                let bounce_ray = Ray::new(surface_point, direction);
                color += self.trace(&bounce_ray, depth + 1, settings, rng) * weight;
            }
        }
        color
    }

    fn direct_light(
        &self,
        ray: &Ray,
        point: &Vec3f,
        surface_point: &Vec3f,
        normal: &Vec3f,
        material: &Material,
    ) -> Vec3f {
        let mut color = Vec3f::zeros();
        for light in &self.lights {
            let to_light = light - point;
            let shadow_ray = Ray::new(*surface_point, to_light);
            if self.is_occluded(&shadow_ray, (light - surface_point).norm()) {
                continue;
            }
            let light_dir = shadow_ray.direction;
            let diffuse = Fp::max(0.0, normal.dot(&light_dir));
            let reflected = get_reflection_ray(&-light_dir, normal).normalize();
            let specular = Fp::max(0.0, reflected.dot(&-ray.direction)).powi(SPECULAR_EXPONENT);
            color += material.color * (material.diffuse * diffuse + material.specular * specular);
        }
        color
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("line {line}: {keyword} expects {expected} arguments")]
    MissingArgument {
        line: usize,
        keyword: String,
        expected: usize,
    },
    #[error("line {line}: cannot parse {token:?} as a number")]
    BadNumber { line: usize, token: String },
    #[error("line {line}: {keyword} used before NEW_PRIMITIVE")]
    NoPrimitive { line: usize, keyword: String },
    #[error("line {line}: primitive has no shape")]
    MissingShape { line: usize },
    #[error("line {line}: degenerate geometry")]
    Degenerate { line: usize },
    #[error("line {line}: dimensions must be positive")]
    BadDimensions { line: usize },
    #[error("line {line}: {keyword} values must lie in [0, 1]")]
    OutOfRange { line: usize, keyword: String },
}

fn unit_interval(value: Fp) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Everything a scene file configures.
#[derive(Debug)]
pub struct SceneDescription {
    pub scene: Scene,
    pub width: u32,
    pub height: u32,
    pub settings: RenderSettings,
    pub seed: Option<u64>,
}

struct PendingPrimitive {
    line: usize,
    shape: Option<Shape3D>,
    material: Material,
}

impl PendingPrimitive {
    fn finish(self) -> Result<Primitive, ParseError> {
        match self.shape {
            Some(shape) => Ok(Primitive {
                shape,
                material: self.material,
            }),
            None => Err(ParseError::MissingShape { line: self.line }),
        }
    }
}

fn parse_numbers<T: std::str::FromStr>(
    tokens: &[&str],
    count: usize,
    line: usize,
) -> Result<Vec<T>, ParseError> {
    if tokens.len() < count + 1 {
        return Err(ParseError::MissingArgument {
            line,
            keyword: tokens[0].to_string(),
            expected: count,
        });
    }
    tokens[1..=count]
        .iter()
        .map(|token| {
            token.parse().map_err(|_| ParseError::BadNumber {
                line,
                token: token.to_string(),
            })
        })
        .collect()
}

/// Parses the line-based scene format. Unknown keywords are skipped.
pub fn parse_file_content(content: Vec<&str>) -> Result<SceneDescription, ParseError> {
    let mut scene = Scene::default();
    let (mut width, mut height) = (800, 600);
    let defaults = RenderSettings::default();
    let (mut max_depth, mut samples, mut antialiasing) =
        (defaults.max_depth, defaults.samples, defaults.antialiasing);
    let mut seed = None;
    let mut current_primitive: Option<PendingPrimitive> = None;

    for (index, line) in content.iter().enumerate() {
        let line_no = index + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() || tokens[0].starts_with('#') {
            continue;
        }
        let get_vector = |offset: usize| -> Result<Vec3f, ParseError> {
            let values: Vec<Fp> = parse_numbers(&tokens, offset + 3, line_no)?;
            Ok(Vec3f::new(
                values[offset],
                values[offset + 1],
                values[offset + 2],
            ))
        };
        let get_scalar =
            || -> Result<Fp, ParseError> { Ok(parse_numbers::<Fp>(&tokens, 1, line_no)?[0]) };
        let get_count =
            || -> Result<u32, ParseError> { Ok(parse_numbers::<u32>(&tokens, 1, line_no)?[0]) };
        let keyword = tokens[0];
        let primitive = current_primitive.as_mut();
        let no_primitive = || ParseError::NoPrimitive {
            line: line_no,
            keyword: keyword.to_string(),
        };
        let get_weight = || -> Result<Fp, ParseError> {
            let value = get_scalar()?;
            if !unit_interval(value) {
                return Err(ParseError::OutOfRange {
                    line: line_no,
                    keyword: keyword.to_string(),
                });
            }
            Ok(value)
        };

        match keyword {
            "DIMENSIONS" => {
                let values: Vec<u32> = parse_numbers(&tokens, 2, line_no)?;
                if values[0] == 0 || values[1] == 0 {
                    return Err(ParseError::BadDimensions { line: line_no });
                }
                width = values[0];
                height = values[1];
            }
            "RAY_DEPTH" => max_depth = get_count()?,
            "SAMPLES" => samples = get_count()?,
            "ANTIALIASING" => antialiasing = get_count()?,
            "SEED" => seed = Some(parse_numbers::<u64>(&tokens, 1, line_no)?[0]),
            "LIGHT_POSITION" => scene.lights.push(get_vector(0)?),
            "NEW_PRIMITIVE" => {
                if let Some(pending) = current_primitive.take() {
                    scene.primitives.push(pending.finish()?);
                }
                current_primitive = Some(PendingPrimitive {
                    line: line_no,
                    shape: None,
                    material: Material::default(),
                });
            }
            "SPHERE" => {
                let center = get_vector(0)?;
                let radius = parse_numbers::<Fp>(&tokens, 4, line_no)?[3];
                if !center.iter().all(|c| c.is_finite()) || !(radius.is_finite() && radius > 0.0) {
                    return Err(ParseError::Degenerate { line: line_no });
                }
                primitive.ok_or_else(no_primitive)?.shape =
                    Some(Shape3D::Sphere { center, radius });
            }
            "CUBE" => {
                let min = get_vector(0)?;
                let max = get_vector(3)?;
                let finite = min.iter().chain(max.iter()).all(|c| c.is_finite());
                if !finite || (0..3).any(|axis| min[axis] >= max[axis]) {
                    return Err(ParseError::Degenerate { line: line_no });
                }
                primitive.ok_or_else(no_primitive)?.shape = Some(Shape3D::Cube { min, max });
            }
            "COLOR" => {
                let color = get_vector(0)?;
                if !color.iter().all(|c| unit_interval(*c)) {
                    return Err(ParseError::OutOfRange {
                        line: line_no,
                        keyword: keyword.to_string(),
                    });
                }
                primitive.ok_or_else(no_primitive)?.material.color = color;
            }
            "DIFFUSE" => primitive.ok_or_else(no_primitive)?.material.diffuse = get_weight()?,
            "SPECULAR" => primitive.ok_or_else(no_primitive)?.material.specular = get_weight()?,
            "REFLECTION" => {
                primitive.ok_or_else(no_primitive)?.material.reflection = get_weight()?
            }
            _ => {
                log::debug!("line {}: ignoring unknown keyword {}", line_no, keyword);
            }
        }
    }
    if let Some(pending) = current_primitive {
        scene.primitives.push(pending.finish()?);
    }
    Ok(SceneDescription {
        scene,
        width,
        height,
        settings: RenderSettings::clamped(max_depth, samples, antialiasing),
        seed,
    })
}
