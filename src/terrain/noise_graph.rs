//! Built-in fBm graph: heights, two splat layers and a jittered scatter

use super::apply::ApplyOperation;
use super::graph::{GenerateContext, Graph};
use super::objects::ObjectInstance;
use super::tile_data::TileData;
use crate::matrix::{Matrix, normalize_layers};
use glam::Vec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

/// Parameters of [`NoiseGraph`]
#[derive(Clone, Debug)]
pub struct NoiseParams {
    pub seed: u32,
    pub scale: f32,        // World units per noise period
    pub octaves: u32,      // FBM octaves
    pub persistence: f32,  // FBM persistence
    pub lacunarity: f32,   // FBM lacunarity
    /// Normalized height where rock starts replacing grass
    pub rock_level: f32,
    /// Scatter cells per tile side; zero disables objects
    pub scatter_density: i32,
    /// Rows written per cooperative tick by the main height apply
    pub apply_rows: i32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 2000.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            rock_level: 0.6,
            scatter_density: 8,
            apply_rows: 64,
        }
    }
}

/// Stand-alone graph producing fBm terrain
///
/// Heights are sampled in world space, so neighboring tiles agree on shared
/// pixels regardless of resolution.
pub struct NoiseGraph {
    params: NoiseParams,
    noise: Fbm<Perlin>,
    revision: u64,
}

impl NoiseGraph {
    pub fn new(params: NoiseParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise, revision: 0 }
    }

    /// Same parameters, new revision; used to force regeneration
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    /// Normalized height (0..1) at a world position
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let nz = (z / self.params.scale) as f64;
        let value = self.noise.get([nx, nz]);
        (((value + 1.0) / 2.0) as f32).clamp(0.0, 1.0)
    }

    /// Integer hash producing a value in [0, 1]
    fn hash_2d(ix: i32, iz: i32, seed: u32) -> f32 {
        let mut h = (ix as u32).wrapping_mul(374761393)
            .wrapping_add((iz as u32).wrapping_mul(668265263))
            .wrapping_add(seed.wrapping_mul(1274126177));
        h = (h ^ (h >> 13)).wrapping_mul(1103515245);
        h = h ^ (h >> 16);
        (h & 0x7FFFFFFF) as f32 / 0x7FFFFFFF_u32 as f32
    }

    fn heights(&self, data: &TileData) -> Matrix {
        let area = data.area;
        let mut height = Matrix::new(area.full());
        for cell in area.full().cells() {
            let world = area.pixel_to_world(cell);
            height.set(cell.x, cell.z, self.height_at(world.x, world.y));
        }
        height
    }

    fn splats(&self, height: &Matrix) -> Vec<Matrix> {
        let level = self.params.rock_level;
        let mut rock = height.clone();
        rock.select_range(level - 0.1, level, 1.5, 2.0);
        let mut grass = rock.clone();
        grass.invert_one();

        let mut layers = vec![grass, rock];
        // layers are built from the same grid, counts always agree
        if let Err(err) = normalize_layers(&mut layers, false) {
            log::warn!("Splat normalization failed: {}", err);
        }
        layers
    }

    /// One object per scatter cell, jittered inside the cell
    fn scatter(&self, data: &TileData) -> Vec<ObjectInstance> {
        let density = self.params.scatter_density;
        if density <= 0 {
            return Vec::new();
        }
        let area = data.area;
        let origin = area.world_origin();
        let cell_size = area.tile_size / density as f32;
        let seed = self.params.seed ^ data.seed as u32;
        let mut objects = Vec::with_capacity((density * density) as usize);

        for cz in 0..density {
            for cx in 0..density {
                let ix = area.coord.x * density + cx;
                let iz = area.coord.z * density + cz;
                let x = origin.x + (cx as f32 + Self::hash_2d(ix, iz, seed)) * cell_size;
                let z = origin.y + (cz as f32 + Self::hash_2d(iz, ix, seed)) * cell_size;
                let y = self.height_at(x, z);
                if y >= self.params.rock_level {
                    continue;
                }
                objects.push(ObjectInstance {
                    position: Vec3::new(x, y, z),
                    rotation: Self::hash_2d(ix, iz, seed.wrapping_add(1)) * std::f32::consts::TAU,
                    scale: 0.8 + 0.4 * Self::hash_2d(ix, iz, seed.wrapping_add(2)),
                    prototype: 0,
                });
            }
        }
        objects
    }
}

impl Default for NoiseGraph {
    fn default() -> Self {
        Self::new(NoiseParams::default())
    }
}

impl Graph for NoiseGraph {
    fn seed(&self) -> i32 {
        self.params.seed as i32
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn generate(&self, data: &mut TileData, ctx: &GenerateContext<'_>) {
        if ctx.is_stopped() {
            return;
        }
        let height = self.heights(data);
        ctx.node_generated("height", data);

        if ctx.is_stopped() {
            return;
        }
        data.products.splats = self.splats(&height);
        data.products.height = Some(height);
        ctx.node_generated("splats", data);

        if ctx.is_stopped() || data.is_draft {
            return;
        }
        data.products.objects = self.scatter(data);
        ctx.node_generated("objects", data);
    }

    fn finalize(&self, data: &mut TileData, ctx: &GenerateContext<'_>) {
        if ctx.is_stopped() || data.products.height.is_none() {
            return;
        }
        if data.is_draft {
            data.push_apply(ApplyOperation::heights());
        } else {
            data.push_apply(ApplyOperation::heights_in_strips(self.params.apply_rows));
        }
        data.push_apply(ApplyOperation::splats());
    }
}
