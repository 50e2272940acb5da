//! Export readiness of shader node materials
//!
//! The binary asset format only understands a metallic-roughness surface
//! (or a pure emitter) fed by image textures. Node graphs that rely on
//! procedural textures, render-time utilities or other surface shaders cannot
//! be represented and block readiness; some other constructs only warn.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

pub const OUTPUT_NODE: &str = "OUTPUT_MATERIAL";

pub const SUPPORTED_SHADER_NODES: &[&str] = &["BSDF_PRINCIPLED", "EMISSION"];

pub const SUPPORTED_TEXTURE_NODES: &[&str] = &["TEX_IMAGE", "UVMAP", "MAPPING", "NORMAL_MAP"];

pub const SUPPORTED_UTILITY_NODES: &[&str] = &[
    "MATH",
    "MIX",
    "VALTORGB",
    "SEPRGB",
    "SEPARATE_COLOR",
    "COMBRGB",
    "COMBINE_COLOR",
    "VECT_MATH",
    "ATTRIBUTE",
];

pub const SUPPORTED_INPUT_NODES: &[&str] = &["RGB", "VALUE", "GEOMETRY", "TEX_COORD"];

pub const UNSUPPORTED_SHADER_NODES: &[&str] = &[
    "BSDF_DIFFUSE",
    "BSDF_GLOSSY",
    "BSDF_ANISOTROPIC",
    "BSDF_GLASS",
    "BSDF_TRANSLUCENT",
    "BSDF_VELVET",
    "BSDF_TOON",
    "BSDF_HAIR",
    "VOLUME_SHADER",
    "SUBSURFACE_SCATTERING",
    "BSDF_REFRACTION",
];

pub const UNSUPPORTED_TEXTURE_NODES: &[&str] = &[
    "TEX_NOISE",
    "TEX_VORONOI",
    "TEX_WAVE",
    "TEX_MAGIC",
    "TEX_CHECKER",
    "TEX_BRICK",
    "TEX_GRADIENT",
    "TEX_MUSGRAVE",
    "TEX_WHITE_NOISE",
];

pub const UNSUPPORTED_UTILITY_NODES: &[&str] = &[
    "LIGHT_PATH",
    "OBJECT_INFO",
    "PARTICLE_INFO",
    "FRESNEL",
    "LAYER_WEIGHT",
    "CURVE_RGB",
    "CURVE_VEC",
    "BLACKBODY",
    "WAVELENGTH",
];

/// Node trees larger than this only export with reduced fidelity
pub const COMPLEX_TREE_NODES: usize = 20;

/// How a node type is treated on export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    Output,
    Supported,
    UnsupportedShader,
    ProceduralTexture,
    UnsupportedUtility,
    Group,
    MixShader,
    Unknown,
}

impl NodeCategory {
    pub fn of(kind: &str) -> Self {
        if kind == OUTPUT_NODE {
            NodeCategory::Output
        } else if SUPPORTED_SHADER_NODES.contains(&kind)
            || SUPPORTED_TEXTURE_NODES.contains(&kind)
            || SUPPORTED_UTILITY_NODES.contains(&kind)
            || SUPPORTED_INPUT_NODES.contains(&kind)
        {
            NodeCategory::Supported
        } else if UNSUPPORTED_SHADER_NODES.contains(&kind) {
            NodeCategory::UnsupportedShader
        } else if UNSUPPORTED_TEXTURE_NODES.contains(&kind) {
            NodeCategory::ProceduralTexture
        } else if UNSUPPORTED_UTILITY_NODES.contains(&kind) {
            NodeCategory::UnsupportedUtility
        } else if kind == "GROUP" {
            NodeCategory::Group
        } else if kind == "MIX_SHADER" {
            NodeCategory::MixShader
        } else {
            NodeCategory::Unknown
        }
    }
}

/// A node in a material's shader graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderNode {
    pub name: String,
    /// Host node type identifier, e.g. `BSDF_PRINCIPLED`
    pub kind: String,
    /// Image name for image texture nodes
    #[serde(default)]
    pub image: Option<String>,
}

impl ShaderNode {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            image: None,
        }
    }

    pub fn image(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "TEX_IMAGE".to_string(),
            image: Some(image.into()),
        }
    }

    fn label(&self) -> String {
        match NodeCategory::of(&self.kind) {
            NodeCategory::Group => format!("{} (Group Node)", self.name),
            _ => format!("{} ({})", self.name, self.kind),
        }
    }

    /// Image names like `wall_1001.png` indicate UDIM tiles
    fn is_udim(&self) -> bool {
        let Some(image) = &self.image else {
            return false;
        };
        let bytes = image.as_bytes();
        bytes.windows(6).any(|w| {
            w[0] == b'_' && w[1..5].iter().all(u8::is_ascii_digit) && w[5] == b'.'
        })
    }
}

/// A link from one node's output into a named input socket of another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLink {
    pub from: usize,
    pub to: usize,
    pub socket: String,
}

/// A material as the host describes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialDefinition {
    pub name: String,
    pub use_nodes: bool,
    pub nodes: Vec<ShaderNode>,
    pub links: Vec<NodeLink>,
}

impl MaterialDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            use_nodes: true,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Add a node, returning its index
    pub fn add_node(&mut self, node: ShaderNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn link(&mut self, from: usize, to: usize, socket: impl Into<String>) {
        self.links.push(NodeLink {
            from,
            to,
            socket: socket.into(),
        });
    }

    /// A Principled BSDF wired straight into the output
    pub fn principled(name: impl Into<String>) -> Self {
        let mut m = Self::new(name);
        let bsdf = m.add_node(ShaderNode::new("Principled BSDF", "BSDF_PRINCIPLED"));
        let out = m.add_node(ShaderNode::new("Material Output", OUTPUT_NODE));
        m.link(bsdf, out, "Surface");
        m
    }

    fn output(&self) -> Option<usize> {
        self.nodes.iter().position(|n| n.kind == OUTPUT_NODE)
    }

    fn input_link(&self, node: usize, socket: &str) -> Option<&NodeLink> {
        self.links
            .iter()
            .find(|l| l.to == node && l.socket == socket && l.from < self.nodes.len())
    }

    /// Nodes connected to `start` through links in either direction
    fn connected_nodes(&self, start: usize) -> Vec<usize> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(n) = queue.pop_front() {
            if n >= self.nodes.len() || !visited.insert(n) {
                continue;
            }
            order.push(n);
            for l in &self.links {
                if l.to == n {
                    queue.push_back(l.from);
                }
                if l.from == n {
                    queue.push_back(l.to);
                }
            }
        }
        order
    }
}

/// Readiness verdict for one material
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub is_ready: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl Readiness {
    fn blocked(heading: &str, detail: &str) -> Self {
        Self {
            is_ready: false,
            issues: vec![heading.to_string(), format!("  • {}", detail)],
            warnings: Vec::new(),
        }
    }

    fn block_section(&mut self, heading: &str, entries: &[String]) {
        if entries.is_empty() {
            return;
        }
        self.is_ready = false;
        self.issues.push(heading.to_string());
        self.issues
            .extend(entries.iter().map(|e| format!("  • {}", e)));
    }
}

/// Check whether a material can be represented in the exported asset
pub fn analyze_readiness(material: &MaterialDefinition) -> Readiness {
    if !material.use_nodes {
        return Readiness::blocked("Material issues:", "Material does not use nodes");
    }
    let Some(output) = material.output() else {
        return Readiness::blocked("Material Output issues:", "Missing Material Output node");
    };
    let Some(surface_link) = material.input_link(output, "Surface") else {
        return Readiness::blocked(
            "Material Output issues:",
            "Material Output Surface input not connected",
        );
    };

    let mut result = Readiness {
        is_ready: true,
        ..Default::default()
    };
    let surface = surface_link.from;

    let mut unsupported_shaders = Vec::new();
    let mut procedural = Vec::new();
    let mut utilities = Vec::new();
    let mut complex_mixes = Vec::new();
    let mut udims = Vec::new();

    if !SUPPORTED_SHADER_NODES.contains(&material.nodes[surface].kind.as_str()) {
        unsupported_shaders.push(material.nodes[surface].label());
    }

    if material.input_link(output, "Volume").is_some() {
        result
            .warnings
            .push("Volume shader connected (limited glTF support)".to_string());
    }

    let connected = material.connected_nodes(output);
    for &idx in &connected {
        if idx == surface {
            continue;
        }
        let node = &material.nodes[idx];
        match NodeCategory::of(&node.kind) {
            NodeCategory::Output | NodeCategory::Supported => {}
            NodeCategory::ProceduralTexture => procedural.push(node.label()),
            NodeCategory::UnsupportedUtility => utilities.push(node.label()),
            NodeCategory::MixShader => {
                let principled_inputs = material
                    .links
                    .iter()
                    .filter(|l| l.to == idx)
                    .filter(|l| {
                        material
                            .nodes
                            .get(l.from)
                            .is_some_and(|n| n.kind == "BSDF_PRINCIPLED")
                    })
                    .count();
                if principled_inputs > 1 {
                    complex_mixes.push(node.name.clone());
                }
                unsupported_shaders.push(node.label());
            }
            NodeCategory::UnsupportedShader | NodeCategory::Group | NodeCategory::Unknown => {
                unsupported_shaders.push(node.label())
            }
        }
        if node.is_udim() {
            udims.push(node.name.clone());
        }
    }

    result.block_section("Unsupported shader nodes:", &unsupported_shaders);
    if !unsupported_shaders.is_empty() {
        result
            .issues
            .push("  Use Principled BSDF or Emission shader instead".to_string());
    }
    result.block_section("Contains procedural textures:", &procedural);
    result.block_section("Contains unsupported utility nodes:", &utilities);
    result.block_section(
        "Complex Mix Shader setup mixing multiple Principled BSDFs:",
        &complex_mixes,
    );

    if !udims.is_empty() {
        result.warnings.push(format!(
            "UDIM textures detected: {} (will split into multiple images)",
            udims.join(", ")
        ));
    }
    if connected.len() > COMPLEX_TREE_NODES {
        result.warnings.push(format!(
            "Complex node tree ({} nodes) - may export with reduced fidelity",
            connected.len()
        ));
    }

    result
}

/// Material readiness block attached to published artifact metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialsSummary {
    pub total: usize,
    pub ready: usize,
    pub unsupported: Vec<String>,
    pub analysis: BTreeMap<String, Readiness>,
}

/// Analyze each distinct material once
pub fn summarize(materials: &[MaterialDefinition]) -> MaterialsSummary {
    let mut summary = MaterialsSummary::default();
    for material in materials {
        if summary.analysis.contains_key(&material.name) {
            continue;
        }
        let readiness = analyze_readiness(material);
        summary.total += 1;
        if readiness.is_ready {
            summary.ready += 1;
        } else {
            summary.unsupported.push(material.name.clone());
        }
        summary.analysis.insert(material.name.clone(), readiness);
    }
    summary
}
