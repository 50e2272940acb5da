//! Reference encoder writing binary glTF 2.0
//!
//! One glTF mesh per export entry and one primitive per material slot.
//! Vertices are split wherever a corner's UVs differ. Mesh compression itself
//! is left to external tooling; the requested settings are recorded in
//! `asset.extras.compression` so downstream tools can apply them.

use crate::encoder::{CompressionConfig, EncodeError, Encoder, EntryKind, ExportSet};
use glbridge_core::{MeshObject, Vector3f};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_UNSIGNED_INT: u32 = 5125;
const MODE_TRIANGLES: u32 = 4;

/// Pad to a 4-byte boundary with `fill`
fn align(buffer: &mut Vec<u8>, fill: u8) {
    while buffer.len() % 4 != 0 {
        buffer.push(fill);
    }
}

fn bounds(values: &[[f32; 3]]) -> (Vec<f32>, Vec<f32>) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for v in values {
        for i in 0..3 {
            min[i] = min[i].min(v[i]);
            max[i] = max[i].max(v[i]);
        }
    }
    (min.to_vec(), max.to_vec())
}

#[derive(Default)]
struct BufferBuilder {
    data: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl BufferBuilder {
    fn push_view(&mut self, bytes: &[u8], target: u32) -> usize {
        align(&mut self.data, 0);
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": bytes.len(),
            "target": target,
        }));
        self.views.len() - 1
    }

    fn push_accessor(&mut self, accessor: Value) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn push_vec3(&mut self, values: &[[f32; 3]], with_bounds: bool) -> usize {
        let view = self.push_view(bytemuck::cast_slice(values), ARRAY_BUFFER);
        let mut accessor = json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": values.len(),
            "type": "VEC3",
        });
        if with_bounds {
            let (min, max) = bounds(values);
            accessor["min"] = json!(min);
            accessor["max"] = json!(max);
        }
        self.push_accessor(accessor)
    }

    fn push_vec2(&mut self, values: &[[f32; 2]]) -> usize {
        let view = self.push_view(bytemuck::cast_slice(values), ARRAY_BUFFER);
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": values.len(),
            "type": "VEC2",
        }))
    }

    fn push_indices(&mut self, indices: &[u32]) -> usize {
        let view = self.push_view(bytemuck::cast_slice(indices), ELEMENT_ARRAY_BUFFER);
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": COMPONENT_UNSIGNED_INT,
            "count": indices.len(),
            "type": "SCALAR",
        }))
    }
}

/// Material names shared across all meshes of one file
#[derive(Default)]
struct MaterialTable {
    names: Vec<String>,
}

impl MaterialTable {
    fn index_of(&mut self, name: &str) -> usize {
        match self.names.iter().position(|n| n == name) {
            Some(idx) => idx,
            None => {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        }
    }
}

/// Vertex data of one mesh after splitting on UV seams
#[derive(Default)]
struct ExpandedMesh {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<Vec<[f32; 2]>>,
    /// Triangle indices per material slot
    indices: Vec<Vec<u32>>,
}

fn expand(mesh: &MeshObject) -> Result<ExpandedMesh, EncodeError> {
    mesh.validate().map_err(|e| EncodeError::InvalidMesh {
        object: mesh.name.clone(),
        reason: e.to_string(),
    })?;

    let mut out = ExpandedMesh {
        uvs: vec![Vec::new(); mesh.uv_channels.len()],
        indices: vec![Vec::new(); mesh.material_slots.len().max(1)],
        ..ExpandedMesh::default()
    };
    let mut lookup: HashMap<(usize, Vec<[u32; 2]>), u32> = HashMap::new();

    for face in &mesh.faces {
        let mut corner_index = Vec::with_capacity(face.vertices.len());
        for (corner, &v) in face.vertices.iter().enumerate() {
            let key = (
                v,
                face.uvs
                    .iter()
                    .map(|ch| [ch[corner][0].to_bits(), ch[corner][1].to_bits()])
                    .collect::<Vec<_>>(),
            );
            let next = out.positions.len();
            let index = *lookup.entry(key).or_insert_with(|| {
                let vertex = &mesh.vertices[v];
                let n = vertex.normal;
                let n = if n.norm() > f32::EPSILON {
                    n.normalize()
                } else {
                    Vector3f::z()
                };
                out.positions.push([vertex.position.x, vertex.position.y, vertex.position.z]);
                out.normals.push([n.x, n.y, n.z]);
                for (channel, layer) in face.uvs.iter().enumerate() {
                    // glTF puts the UV origin at the top left
                    let [s, t] = layer[corner];
                    out.uvs[channel].push([s, 1.0 - t]);
                }
                next as u32
            });
            corner_index.push(index);
        }
        let slot = face.material_index.min(out.indices.len() - 1);
        for k in 1..corner_index.len() - 1 {
            out.indices[slot].extend([corner_index[0], corner_index[k], corner_index[k + 1]]);
        }
    }
    Ok(out)
}

/// Writes `.glb` containers
#[derive(Debug, Clone)]
pub struct GlbEncoder {
    pub generator: String,
}

impl Default for GlbEncoder {
    fn default() -> Self {
        Self {
            generator: format!("glbridge {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GlbEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn encode_mesh(
        &self,
        mesh: &MeshObject,
        buffer: &mut BufferBuilder,
        materials: &mut MaterialTable,
    ) -> Result<Option<Value>, EncodeError> {
        let expanded = expand(mesh)?;
        if expanded.positions.is_empty() {
            return Ok(None);
        }

        let mut attributes = Map::new();
        attributes.insert("POSITION".into(), json!(buffer.push_vec3(&expanded.positions, true)));
        attributes.insert("NORMAL".into(), json!(buffer.push_vec3(&expanded.normals, false)));
        for (channel, uvs) in expanded.uvs.iter().enumerate() {
            attributes.insert(format!("TEXCOORD_{}", channel), json!(buffer.push_vec2(uvs)));
        }

        let mut primitives = Vec::new();
        for (slot, indices) in expanded.indices.iter().enumerate() {
            if indices.is_empty() {
                continue;
            }
            let mut primitive = json!({
                "attributes": attributes.clone(),
                "indices": buffer.push_indices(indices),
                "mode": MODE_TRIANGLES,
            });
            if let Some(material) = mesh.material_slots.get(slot).and_then(|s| s.material.as_deref()) {
                primitive["material"] = json!(materials.index_of(material));
            }
            primitives.push(primitive);
        }
        Ok(Some(json!({ "name": mesh.name, "primitives": primitives })))
    }

    fn document(&self, set: &ExportSet, compression: &CompressionConfig) -> Result<(Value, Vec<u8>), EncodeError> {
        let mut buffer = BufferBuilder::default();
        let mut materials = MaterialTable::default();
        let mut meshes = Vec::new();
        let mut nodes = Vec::new();

        for entry in &set.entries {
            let mut node = json!({ "name": entry.name });
            match &entry.kind {
                EntryKind::Mesh(mesh) => {
                    if let Some(encoded) = self.encode_mesh(mesh, &mut buffer, &mut materials)? {
                        meshes.push(encoded);
                        node["mesh"] = json!(meshes.len() - 1);
                    }
                    if !mesh.transform.is_identity(1e-6) {
                        // column-major, as glTF expects
                        node["matrix"] = json!(mesh.transform.matrix.as_slice());
                    }
                    if entry.sources.len() > 1 || entry.sources.first() != Some(&entry.name) {
                        node["extras"] = json!({ "sources": entry.sources });
                    }
                }
                EntryKind::Instance { collection } => {
                    let children: Vec<usize> = set
                        .entries
                        .iter()
                        .enumerate()
                        .filter(|(_, e)| e.instanced && e.sources.iter().any(|s| collection.contains(s)))
                        .map(|(j, _)| j)
                        .collect();
                    if !children.is_empty() {
                        node["children"] = json!(children);
                    }
                }
                EntryKind::Empty => {}
            }
            nodes.push(node);
        }

        let claimed: Vec<usize> = nodes
            .iter()
            .filter_map(|n| n.get("children").and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_u64)
            .map(|j| j as usize)
            .collect();
        let roots: Vec<usize> = (0..nodes.len()).filter(|i| !claimed.contains(i)).collect();

        let mut root = json!({
            "asset": {
                "version": "2.0",
                "generator": self.generator,
                "extras": { "compression": serde_json::to_value(compression)? },
            },
            "scene": 0,
            "scenes": [{ "nodes": roots }],
            "nodes": nodes,
        });
        if !meshes.is_empty() {
            root["meshes"] = json!(meshes);
        }
        if !materials.names.is_empty() {
            root["materials"] = json!(materials
                .names
                .iter()
                .map(|name| json!({ "name": name }))
                .collect::<Vec<_>>());
        }
        if !buffer.data.is_empty() {
            align(&mut buffer.data, 0);
            root["buffers"] = json!([{ "byteLength": buffer.data.len() }]);
            root["bufferViews"] = json!(buffer.views);
            root["accessors"] = json!(buffer.accessors);
        }
        Ok((root, buffer.data))
    }
}

/// Wrap a glTF JSON document and its binary buffer into a GLB container
pub fn assemble_glb(document: &Value, bin: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut json_chunk = serde_json::to_vec(document)?;
    align(&mut json_chunk, b' ');
    let mut bin_chunk = bin.to_vec();
    align(&mut bin_chunk, 0);

    let mut total = 12 + 8 + json_chunk.len();
    if !bin_chunk.is_empty() {
        total += 8 + bin_chunk.len();
    }
    let total_u32 = u32::try_from(total).map_err(|_| EncodeError::TooLarge)?;

    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(GLB_MAGIC);
    glb.extend_from_slice(&GLB_VERSION.to_le_bytes());
    glb.extend_from_slice(&total_u32.to_le_bytes());

    glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    glb.extend_from_slice(&json_chunk);

    if !bin_chunk.is_empty() {
        glb.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        glb.extend_from_slice(&bin_chunk);
    }
    Ok(glb)
}

impl Encoder for GlbEncoder {
    fn encode(&self, set: &ExportSet, compression: &CompressionConfig) -> Result<Vec<u8>, EncodeError> {
        if set.is_empty() {
            return Err(EncodeError::Empty);
        }
        compression.validate()?;
        let (document, bin) = self.document(set, compression)?;
        let glb = assemble_glb(&document, &bin)?;
        debug!(entries = set.len(), bytes = glb.len(), "encoded GLB");
        Ok(glb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ExportEntry;
    use glbridge_core::{Point3f, Transform3D, Vector3};

    fn make_two_material_quad(name: &str) -> MeshObject {
        let mut mesh = MeshObject::from_polygons(
            name,
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(2.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(2.0, 1.0, 0.0),
            ],
            vec![vec![0, 1, 4, 3], vec![1, 2, 5, 4]],
        )
        .with_material_slots(["Wood", "Metal"]);
        mesh.faces[1].material_index = 1;
        let ch = mesh.add_uv_channel("UVMap");
        mesh.faces[0].uvs[ch] = vec![[0.0, 0.0], [0.5, 0.0], [0.5, 1.0], [0.0, 1.0]];
        // seam along the shared edge
        mesh.faces[1].uvs[ch] = vec![[0.6, 0.0], [1.0, 0.0], [1.0, 1.0], [0.6, 1.0]];
        mesh.recompute_normals();
        mesh
    }

    fn parse(glb: &[u8]) -> Value {
        let json_len = u32::from_le_bytes([glb[12], glb[13], glb[14], glb[15]]) as usize;
        serde_json::from_slice(&glb[20..20 + json_len]).unwrap()
    }

    #[test]
    fn test_container_header() {
        let mut set = ExportSet::new();
        set.push(ExportEntry::mesh("Panel", vec!["Panel".into()], make_two_material_quad("Panel")));
        let glb = GlbEncoder::new().encode(&set, &CompressionConfig::default()).unwrap();

        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes([glb[4], glb[5], glb[6], glb[7]]), 2);
        assert_eq!(u32::from_le_bytes([glb[8], glb[9], glb[10], glb[11]]) as usize, glb.len());
        assert_eq!(glb.len() % 4, 0);
        assert_eq!(&glb[16..20], b"JSON");
    }

    #[test]
    fn test_primitive_per_material_and_seam_split() {
        let mut set = ExportSet::new();
        set.push(ExportEntry::mesh("Panel", vec!["Panel".into()], make_two_material_quad("Panel")));
        let doc = parse(&GlbEncoder::new().encode(&set, &CompressionConfig::default()).unwrap());

        let primitives = doc["meshes"][0]["primitives"].as_array().unwrap();
        assert_eq!(primitives.len(), 2);
        assert_eq!(doc["materials"][1]["name"], "Metal");
        let position = primitives[0]["attributes"]["POSITION"].as_u64().unwrap() as usize;
        // 6 shared positions, the 2 seam vertices duplicated
        assert_eq!(doc["accessors"][position]["count"], 8);
        assert_eq!(doc["accessors"][position]["max"][0].as_f64().unwrap(), 2.0);
        let indices = primitives[1]["indices"].as_u64().unwrap() as usize;
        assert_eq!(doc["accessors"][indices]["count"], 6);
        assert!(primitives[0]["attributes"].get("TEXCOORD_0").is_some());
    }

    #[test]
    fn test_instances_and_transforms() {
        let mut set = ExportSet::new();
        let moved = make_two_material_quad("Lamp")
            .with_transform(Transform3D::translation(Vector3::new(0.0, 0.0, 3.0)));
        let mut member = ExportEntry::mesh("Lamp", vec!["Lamp".into()], moved);
        member.instanced = true;
        set.push(ExportEntry::instance("LampArray", vec!["Lamp".into()]));
        set.push(member);
        let doc = parse(&GlbEncoder::new().encode(&set, &CompressionConfig::disabled()).unwrap());

        assert_eq!(doc["scenes"][0]["nodes"], json!([0]));
        assert_eq!(doc["nodes"][0]["children"], json!([1]));
        assert_eq!(doc["nodes"][1]["matrix"][14].as_f64().unwrap(), 3.0);
        assert_eq!(doc["asset"]["extras"]["compression"]["enabled"], false);
    }

    #[test]
    fn test_empty_and_invalid_input() {
        let encoder = GlbEncoder::new();
        assert!(matches!(
            encoder.encode(&ExportSet::new(), &CompressionConfig::default()),
            Err(EncodeError::Empty)
        ));

        let mut broken = make_two_material_quad("Broken");
        broken.faces[0].vertices[0] = 99;
        let mut set = ExportSet::new();
        set.push(ExportEntry::mesh("Broken", vec!["Broken".into()], broken));
        assert!(matches!(
            encoder.encode(&set, &CompressionConfig::default()),
            Err(EncodeError::InvalidMesh { .. })
        ));
    }

    #[test]
    fn test_faceless_mesh_has_no_buffer() {
        let mut set = ExportSet::new();
        set.push(ExportEntry::mesh("Empty", vec!["Empty".into()], MeshObject::new("Empty")));
        let glb = GlbEncoder::new().encode(&set, &CompressionConfig::default()).unwrap();
        let doc = parse(&glb);
        assert!(doc.get("buffers").is_none());
        assert!(doc["nodes"][0].get("mesh").is_none());
        assert_eq!(u32::from_le_bytes([glb[8], glb[9], glb[10], glb[11]]) as usize, glb.len());
    }
}
