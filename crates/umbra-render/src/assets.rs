//! The asset store interface and the in-process store.
//!
//! Decoding asset files is the application's business. The renderer only
//! resolves [`AssetKey`]s to shared meshes and textures, and substitutes a
//! [`Placeholders`] entry (with a warning) when a key does not resolve, so a
//! missing asset never fails the frame.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use umbra_math::Aabb;

/// Normalized asset path: forward slashes, no `.` segments, no leading `./`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey(String);

impl AssetKey {
    pub fn new(path: &str) -> Self {
        let normalized = path
            .replace('\\', "/")
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("/");
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetKey {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A missing or unusable asset. Never fatal to the frame.
#[derive(Debug, thiserror::Error)]
pub enum ResourceLoadError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: AssetKey },

    #[error("failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("'{key}' is unusable: {reason}")]
    Invalid { key: AssetKey, reason: String },
}

/// Mesh vertex, shared by the software and GPU geometry paths.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv: uv.to_array(),
        }
    }
}

/// Per-vertex joint influences of a skinned mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct Skin {
    /// Up to four joint indices into the palette per vertex.
    pub joints: Vec<[u16; 4]>,
    /// Matching weights; they sum to one.
    pub weights: Vec<[f32; 4]>,
}

/// An indexed triangle mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    /// Counter-clockwise triangle list.
    pub indices: Vec<u32>,
    pub skin: Option<Skin>,
    /// Model-space bounds.
    pub bounds: Aabb,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let points: Vec<Vec3> = vertices.iter().map(|v| Vec3::from(v.position)).collect();
        let bounds = Aabb::from_points(&points).unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));
        Self {
            vertices,
            indices,
            skin: None,
            bounds,
        }
    }

    /// Attach joint influences. They must match the vertex count.
    pub fn with_skin(mut self, skin: Skin) -> Result<Self, ResourceLoadError> {
        if skin.joints.len() != self.vertices.len() || skin.weights.len() != self.vertices.len() {
            return Err(ResourceLoadError::Invalid {
                key: AssetKey::new("<skin>"),
                reason: format!(
                    "{} joints / {} weights for {} vertices",
                    skin.joints.len(),
                    skin.weights.len(),
                    self.vertices.len()
                ),
            });
        }
        self.skin = Some(skin);
        Ok(self)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned cube from -0.5 to 0.5 with per-face normals.
    pub fn cube() -> Self {
        let faces = [
            (Vec3::X, Vec3::Y),
            (Vec3::NEG_X, Vec3::Y),
            (Vec3::Y, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::Z),
            (Vec3::Z, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, up) in faces {
            let right = up.cross(normal);
            let base = vertices.len() as u32;
            for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                let p = normal * 0.5 + right * (u - 0.5) + up * (v - 0.5);
                vertices.push(Vertex::new(p, normal, Vec2::new(u, 1.0 - v)));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }

    /// Unit-radius UV sphere.
    pub fn uv_sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        for r in 0..=rings {
            let v = r as f32 / rings as f32;
            let theta = v * std::f32::consts::PI;
            for s in 0..=segments {
                let u = s as f32 / segments as f32;
                let phi = u * std::f32::consts::TAU;
                let n = Vec3::new(theta.sin() * phi.cos(), theta.cos(), -theta.sin() * phi.sin());
                vertices.push(Vertex::new(n, n, Vec2::new(u, v)));
            }
        }
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
        let stride = segments + 1;
        for r in 0..rings {
            for s in 0..segments {
                let a = r * stride + s;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        Self::new(vertices, indices)
    }
}

/// An RGBA8 texture. Colors are sampled as-is in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    image: image::RgbaImage,
    average: Vec4,
}

impl Texture {
    pub fn new(image: image::RgbaImage) -> Self {
        let count = (image.width() as u64 * image.height() as u64).max(1) as f32;
        let sum = image
            .pixels()
            .fold(Vec4::ZERO, |acc, p| acc + rgba_to_vec4(p.0));
        Self {
            image,
            average: sum / count,
        }
    }

    /// A single-color 1×1 texture.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(image::RgbaImage::from_pixel(1, 1, image::Rgba(rgba)))
    }

    /// Magenta and black checkerboard.
    pub fn checker(size: u32) -> Self {
        let size = size.max(2);
        Self::new(image::RgbaImage::from_fn(size, size, |x, y| {
            if (x * 2 / size + y * 2 / size) % 2 == 0 {
                image::Rgba([255, 0, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        }))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &image::RgbaImage {
        &self.image
    }

    /// Mean color, used where a draw has no texture coordinates to sample.
    pub fn average(&self) -> Vec4 {
        self.average
    }

    /// Nearest-texel sample with wrapping.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let (w, h) = (self.image.width(), self.image.height());
        let x = ((uv.x.rem_euclid(1.0) * w as f32) as u32).min(w - 1);
        let y = ((uv.y.rem_euclid(1.0) * h as f32) as u32).min(h - 1);
        rgba_to_vec4(self.image.get_pixel(x, y).0)
    }

    /// Texel at integer coordinates, clamped to the edges.
    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        let x = x.min(self.image.width() - 1);
        let y = y.min(self.image.height() - 1);
        rgba_to_vec4(self.image.get_pixel(x, y).0)
    }
}

fn rgba_to_vec4(p: [u8; 4]) -> Vec4 {
    Vec4::new(p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32) / 255.0
}

/// Resolves asset keys to shared, decoded assets.
pub trait AssetStore: Send + Sync {
    fn mesh(&self, key: &AssetKey) -> Result<Arc<Mesh>, ResourceLoadError>;
    fn texture(&self, key: &AssetKey) -> Result<Arc<Texture>, ResourceLoadError>;
}

/// Assets held in memory, inserted by the application.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    meshes: RwLock<FxHashMap<AssetKey, Arc<Mesh>>>,
    textures: RwLock<FxHashMap<AssetKey, Arc<Texture>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_mesh(&self, key: impl Into<AssetKey>, mesh: Mesh) -> Arc<Mesh> {
        let mesh = Arc::new(mesh);
        if let Ok(mut meshes) = self.meshes.write() {
            meshes.insert(key.into(), Arc::clone(&mesh));
        }
        mesh
    }

    pub fn insert_texture(&self, key: impl Into<AssetKey>, texture: Texture) -> Arc<Texture> {
        let texture = Arc::new(texture);
        if let Ok(mut textures) = self.textures.write() {
            textures.insert(key.into(), Arc::clone(&texture));
        }
        texture
    }

    /// Decode an image file and store it under `key`.
    pub fn load_texture_file(
        &self,
        key: impl Into<AssetKey>,
        path: &Path,
    ) -> Result<Arc<Texture>, ResourceLoadError> {
        let image = image::open(path).map_err(|source| ResourceLoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded texture {}", path.display());
        Ok(self.insert_texture(key, Texture::new(image.to_rgba8())))
    }
}

impl AssetStore for MemoryAssetStore {
    fn mesh(&self, key: &AssetKey) -> Result<Arc<Mesh>, ResourceLoadError> {
        self.meshes
            .read()
            .ok()
            .and_then(|meshes| meshes.get(key).cloned())
            .ok_or_else(|| ResourceLoadError::NotFound {
                kind: "mesh",
                key: key.clone(),
            })
    }

    fn texture(&self, key: &AssetKey) -> Result<Arc<Texture>, ResourceLoadError> {
        self.textures
            .read()
            .ok()
            .and_then(|textures| textures.get(key).cloned())
            .ok_or_else(|| ResourceLoadError::NotFound {
                kind: "texture",
                key: key.clone(),
            })
    }
}

/// Stand-ins for assets that failed to resolve.
#[derive(Clone, Debug)]
pub struct Placeholders {
    /// Unit cube.
    pub mesh: Arc<Mesh>,
    /// Magenta checkerboard, for missing albedo textures.
    pub missing: Arc<Texture>,
    /// Opaque white, a no-op for multiplicative textures.
    pub white: Arc<Texture>,
    /// Flat tangent-space normal.
    pub flat_normal: Arc<Texture>,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            mesh: Arc::new(Mesh::cube()),
            missing: Arc::new(Texture::checker(8)),
            white: Arc::new(Texture::solid([255; 4])),
            flat_normal: Arc::new(Texture::solid([128, 128, 255, 255])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_key_normalization() {
        assert_eq!(AssetKey::new("./meshes\\rock.obj").as_str(), "meshes/rock.obj");
        assert_eq!(AssetKey::new("a//b/./c"), AssetKey::new("a/b/c"));
    }

    #[test]
    fn test_memory_store_resolves_inserted_assets() {
        let store = MemoryAssetStore::new();
        store.insert_mesh("cube", Mesh::cube());
        store.insert_texture("white", Texture::solid([255; 4]));
        assert!(store.mesh(&"cube".into()).is_ok());
        assert!(store.texture(&"./white".into()).is_ok());
    }

    #[test]
    fn test_missing_asset_is_not_found() {
        let store = MemoryAssetStore::new();
        let err = store.mesh(&"nope".into()).unwrap_err();
        assert!(matches!(err, ResourceLoadError::NotFound { kind: "mesh", .. }));
        assert_eq!(err.to_string(), "mesh 'nope' not found");
    }

    #[test]
    fn test_load_texture_file_reports_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]))
            .save(&good)
            .unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not a png").unwrap();

        let store = MemoryAssetStore::new();
        let texture = store.load_texture_file("good", &good).unwrap();
        assert_eq!(texture.width(), 2);
        assert!(matches!(
            store.load_texture_file("bad", &bad),
            Err(ResourceLoadError::Decode { .. })
        ));
    }

    #[test]
    fn test_cube_is_closed_and_unit_sized() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert!((cube.bounds.size() - Vec3::ONE).length() < 1e-6);
    }

    /// Face winding must agree with the stored normals.
    #[test]
    fn test_cube_winding_matches_normals() {
        let cube = Mesh::cube();
        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from(cube.vertices[tri[i] as usize].position));
            let n = Vec3::from(cube.vertices[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(n) > 0.0);
        }
    }

    #[test]
    fn test_sphere_vertices_are_on_unit_sphere() {
        let sphere = Mesh::uv_sphere(12, 8);
        for v in &sphere.vertices {
            assert!((Vec3::from(v.position).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_skin_must_match_vertex_count() {
        let skin = Skin {
            joints: vec![[0; 4]; 3],
            weights: vec![[1.0, 0.0, 0.0, 0.0]; 3],
        };
        assert!(Mesh::cube().with_skin(skin).is_err());
    }

    #[test]
    fn test_texture_sampling_wraps() {
        let texture = Texture::checker(4);
        assert_eq!(texture.sample(Vec2::new(0.1, 0.1)), texture.sample(Vec2::new(1.1, 1.1)));
        assert_eq!(texture.sample(Vec2::ZERO), Vec4::new(1.0, 0.0, 1.0, 1.0));
    }
}
