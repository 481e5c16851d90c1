use std::path::Path;

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::LoadError;
use crate::handle::Handle;

use super::{Asset, AssetCache, LoadMode};

/// Interleaved mesh vertex, laid out for direct GPU upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Asset for Mesh {
    const KIND: &'static str = "mesh";
    type Source = Mesh;

    fn read_source(path: &Path) -> Result<Mesh, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;
        parse_obj(&text).map_err(|reason| LoadError::Decode {
            path: path.to_owned(),
            reason,
        })
    }

    fn build(source: Mesh, _cache: &mut AssetCache, _mode: LoadMode) -> Result<Self, LoadError> {
        Ok(source)
    }
}

const NO_ATTR: usize = usize::MAX;

/// Wavefront OBJ parser. Faces are triangulated by fan, corners sharing
/// the same position/uv/normal triple are deduplicated into one vertex.
/// Statements outside the v/vt/vn/f set (object names, groups, material
/// libraries) are ignored.
fn parse_obj(text: &str) -> Result<Mesh, String> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();

    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut corner_cache: FxHashMap<(usize, usize, usize), u32> = FxHashMap::default();

    for (line_number, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => positions.push(
                parse_floats::<3>(&mut fields)
                    .map_err(|reason| format!("line {}: {}", line_number + 1, reason))?,
            ),
            Some("vt") => uvs.push(
                parse_floats::<2>(&mut fields)
                    .map_err(|reason| format!("line {}: {}", line_number + 1, reason))?,
            ),
            Some("vn") => normals.push(
                parse_floats::<3>(&mut fields)
                    .map_err(|reason| format!("line {}: {}", line_number + 1, reason))?,
            ),
            Some("f") => {
                let mut face: Vec<u32> = Vec::with_capacity(4);
                for corner in fields {
                    let key =
                        corner_key(corner, positions.len(), uvs.len(), normals.len())
                            .map_err(|reason| format!("line {}: {}", line_number + 1, reason))?;
                    let vertex_index = *corner_cache.entry(key).or_insert_with(|| {
                        vertices.push(Vertex {
                            position: positions[key.0],
                            normal: if key.2 == NO_ATTR { [0.0; 3] } else { normals[key.2] },
                            uv: if key.1 == NO_ATTR { [0.0; 2] } else { uvs[key.1] },
                        });
                        (vertices.len() - 1) as u32
                    });
                    face.push(vertex_index);
                }
                if face.len() < 3 {
                    return Err(format!(
                        "line {}: face with only {} corners",
                        line_number + 1,
                        face.len()
                    ));
                }
                for n in 1..face.len() - 1 {
                    indices.extend_from_slice(&[face[0], face[n], face[n + 1]]);
                }
            }
            _ => {}
        }
    }

    if indices.is_empty() {
        return Err("no face data".into());
    }
    Ok(Mesh { vertices, indices })
}

fn parse_floats<const N: usize>(
    fields: &mut std::str::SplitWhitespace,
) -> Result<[f32; N], String> {
    let mut out = [0.0; N];
    for slot in &mut out {
        let field = fields.next().ok_or_else(|| "missing coordinate".to_string())?;
        *slot = field
            .parse()
            .map_err(|_| format!("bad coordinate {:?}", field))?;
    }
    Ok(out)
}

/// Resolves one `f` corner of the form `v`, `v/vt`, `v/vt/vn` or
/// `v//vn`. Indices are 1-based, negative values count back from the
/// end of the respective attribute list.
fn corner_key(
    corner: &str,
    positions: usize,
    uvs: usize,
    normals: usize,
) -> Result<(usize, usize, usize), String> {
    let mut parts = corner.split('/');
    let position = match parts.next() {
        Some(field) if !field.is_empty() => resolve_index(field, positions)?,
        _ => return Err(format!("bad corner {:?}", corner)),
    };
    let uv = match parts.next() {
        Some("") | None => NO_ATTR,
        Some(field) => resolve_index(field, uvs)?,
    };
    let normal = match parts.next() {
        Some("") | None => NO_ATTR,
        Some(field) => resolve_index(field, normals)?,
    };
    Ok((position, uv, normal))
}

fn resolve_index(field: &str, len: usize) -> Result<usize, String> {
    let index: isize = field
        .parse()
        .map_err(|_| format!("bad index {:?}", field))?;
    let resolved = if index > 0 {
        index as usize - 1
    } else if index < 0 {
        len.checked_sub(index.unsigned_abs())
            .ok_or_else(|| format!("index {} out of range", index))?
    } else {
        return Err("zero index".into());
    };
    if resolved < len {
        Ok(resolved)
    } else {
        Err(format!("index {} out of range", index))
    }
}

/// RGBA8 raster image, decoded and converted on a loader thread.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Asset for Texture {
    const KIND: &'static str = "texture";
    type Source = Texture;

    fn read_source(path: &Path) -> Result<Texture, LoadError> {
        let image = image::open(path).map_err(|error| match error {
            image::ImageError::IoError(source) => LoadError::Io {
                path: path.to_owned(),
                source,
            },
            other => LoadError::Decode {
                path: path.to_owned(),
                reason: other.to_string(),
            },
        })?;
        let rgba = image.into_rgba8();
        Ok(Texture {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })
    }

    fn build(source: Texture, _cache: &mut AssetCache, _mode: LoadMode) -> Result<Self, LoadError> {
        Ok(source)
    }
}

fn default_base_color() -> [f32; 4] {
    [1.0; 4]
}

/// On-disk material description.
#[derive(Clone, Debug, Deserialize)]
pub struct MaterialDesc {
    #[serde(default = "default_base_color")]
    pub base_color: [f32; 4],
    #[serde(default)]
    pub diffuse: Option<String>,
}

/// Material linked against the cache: the diffuse key from the
/// descriptor is requested as a [`Texture`] during `build`, inheriting
/// the sync/async mode of the material load itself.
#[derive(Clone, Copy, Debug)]
pub struct Material {
    pub base_color: [f32; 4],
    pub diffuse: Option<Handle<Texture>>,
}

impl Asset for Material {
    const KIND: &'static str = "material";
    type Source = MaterialDesc;

    fn read_source(path: &Path) -> Result<MaterialDesc, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|error| LoadError::Decode {
            path: path.to_owned(),
            reason: error.to_string(),
        })
    }

    fn build(desc: MaterialDesc, cache: &mut AssetCache, mode: LoadMode) -> Result<Self, LoadError> {
        let diffuse = match desc.diffuse {
            Some(key) => Some(match mode {
                LoadMode::Sync => cache.load::<Texture>(&key)?,
                LoadMode::Async => cache.load_async::<Texture>(&key),
            }),
            None => None,
        };
        Ok(Self {
            base_color: desc.base_color,
            diffuse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_triangle() {
        let mesh = parse_obj(
            "# comment\n\
             v 0 0 0\n\
             v 1 0 0\n\
             v 0 1 0\n\
             f 1 2 3\n",
        )
        .unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn quads_are_fan_triangulated() {
        let mesh = parse_obj(
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             f 1 2 3 4\n",
        )
        .unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn corners_are_deduplicated_across_faces() {
        let mesh = parse_obj(
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             f 1 2 3\nf 1 3 4\n",
        )
        .unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn corner_forms_and_attributes() {
        let mesh = parse_obj(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             vt 0.5 0.5\n\
             vn 0 0 1\n\
             f 1/1/1 2//1 3/1\n",
        )
        .unwrap();
        assert_eq!(mesh.vertices[0].uv, [0.5, 0.5]);
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices[1].uv, [0.0, 0.0]);
        assert_eq!(mesh.vertices[1].normal, [0.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices[2].normal, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let mesh = parse_obj(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             f -3 -2 -1\n",
        )
        .unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let result = parse_obj("v 0 0 0\nf 1 2 3\n");
        assert!(result.unwrap_err().contains("out of range"));
    }

    #[test]
    fn empty_file_is_rejected() {
        assert_eq!(parse_obj("v 0 0 0\n"), Err("no face data".into()));
    }

    #[test]
    fn material_desc_defaults() {
        let desc: MaterialDesc = toml::from_str("").unwrap();
        assert_eq!(desc.base_color, [1.0; 4]);
        assert!(desc.diffuse.is_none());

        let desc: MaterialDesc =
            toml::from_str("base_color = [0.2, 0.3, 0.4, 1.0]\ndiffuse = \"a.png\"").unwrap();
        assert_eq!(desc.base_color, [0.2, 0.3, 0.4, 1.0]);
        assert_eq!(desc.diffuse.as_deref(), Some("a.png"));
    }
}
