//! The graph root: per-stage buffers, rate-indexed input/output lists and
//! the auto-complete pass that turns them into declarations.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};

use super::convert::convert_symbol;
use super::defaults;
use super::error::GenerateError;
use super::glsl::{GlslBuffer, Token};
use super::node::{NodeData, NodeId};
use super::node_compiler::{self, NodeKind};
use super::types::{DataType, Rate, ShaderStage, Symbol, Trait, TraitId};
use crate::assets::AssetFactory;
use crate::dsl::{self, Construct, ConstructKind};

pub const DEFAULT_VERSION: u32 = 450;

const RED: &str = "vec4(1.0, 0.0, 0.0, 1.0)";

const FULLSCREEN_VERTEX: &str = "int vertexIndex = int(gl_VertexIndex);
vec2 fullscreen = vec2(float((vertexIndex << 1) & 2), float(vertexIndex & 2));
gl_Position = vec4(fullscreen * 2.0 - 1.0, 0.0, 1.0);";

/// A declared material input or stage output.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub key: Trait,
    pub name: String,
    /// Sampler binding slot for texture inputs.
    pub sampler: Option<u32>,
    /// The value is already assigned by generated code; skip auto-wiring.
    pub wired: bool,
    /// Interface location shared by both ends of a stage bridge. Unbridged
    /// bindings are numbered after the bridged ones when declared.
    pub location: Option<u32>,
}

#[derive(Debug)]
pub struct Material {
    pub(crate) nodes: Vec<NodeData>,
    root: NodeId,
    stages: [GlslBuffer; ShaderStage::COUNT],
    default_rate: Rate,
    version: u32,
    samplers: u32,
    /// Next free bridge location, per consuming rate.
    varyings: Vec<u32>,
    inputs: Vec<Vec<Binding>>,
    outputs: Vec<Vec<Binding>>,
    functions: HashSet<(ShaderStage, String)>,
    warnings: Vec<String>,
    generated: bool,
}

impl Material {
    pub fn new(default_rate: Rate) -> Self {
        let default_rate = if default_rate == Rate::Auto {
            Rate::Pixel
        } else {
            default_rate
        };
        let mut material = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            stages: std::array::from_fn(|_| GlslBuffer::new()),
            default_rate,
            version: DEFAULT_VERSION,
            samplers: 0,
            varyings: vec![0; Rate::COUNT],
            inputs: vec![Vec::new(); Rate::COUNT],
            outputs: vec![Vec::new(); Rate::COUNT],
            functions: HashSet::new(),
            warnings: Vec::new(),
            generated: false,
        };
        material.root = material.add_node(
            NodeKind::Root,
            None,
            default_rate,
            Construct::new(ConstructKind::Material),
        );
        material
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Build the node tree described by a `Material` construct.
    pub fn from_descriptor(root: &Construct, factory: &dyn AssetFactory) -> Result<Self> {
        if root.kind != ConstructKind::Material {
            bail!(GenerateError::Config(format!(
                "descriptor root must be a Material, got {:?}",
                root.kind
            )));
        }
        let rate = parse_rate(root)?.unwrap_or(Rate::Pixel);
        let version = match dsl::trait_f64(root, TraitId::Version) {
            Some(v) if v >= 100.0 => v as u32,
            Some(v) => bail!(GenerateError::Config(format!("invalid GLSL version {v}"))),
            None => DEFAULT_VERSION,
        };

        let mut material = Material::new(rate).with_version(version);
        let root_id = material.root;
        material.node_mut(root_id).descriptor = local_descriptor(root);
        for child in &root.children {
            material.instantiate(root_id, child, factory)?;
        }
        log::debug!(
            "material built: {} nodes, default rate {}, version {}",
            material.nodes.len(),
            rate.name(),
            version
        );
        Ok(material)
    }

    fn instantiate(
        &mut self,
        parent: NodeId,
        construct: &Construct,
        factory: &dyn AssetFactory,
    ) -> Result<NodeId> {
        if !construct.kind.is_node() {
            bail!(GenerateError::Config(format!(
                "{:?} construct cannot appear under a {} node",
                construct.kind,
                self.node(parent).kind.name()
            )));
        }
        let rate = match parse_rate(construct)? {
            Some(Rate::Auto) | None => self.default_rate,
            Some(rate) => rate,
        };
        let kind = node_compiler::build_kind(construct, factory).with_context(|| {
            format!(
                "invalid {:?} construct{}",
                construct.kind,
                construct
                    .display_name()
                    .map(|n| format!(" '{n}'"))
                    .unwrap_or_default()
            )
        })?;
        let name = construct.display_name().map(str::to_string);
        let id = self.add_node(kind, name, rate, local_descriptor(construct));

        let parent = match dsl::trait_str(construct, TraitId::Parent) {
            Some(target) => self.find_node_by_name(target).ok_or_else(|| {
                GenerateError::config(format!("parent node '{target}' does not exist (yet)"))
            })?,
            None => parent,
        };
        self.add_child(parent, id)?;

        for child in construct.children.iter().filter(|c| c.kind.is_node()) {
            self.instantiate(id, child, factory)?;
        }
        Ok(id)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn default_rate(&self) -> Rate {
        self.default_rate
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Soft fallbacks that fired during generation, oldest first.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn inputs(&self, rate: Rate) -> &[Binding] {
        rate.index().map(|i| self.inputs[i].as_slice()).unwrap_or(&[])
    }

    pub fn outputs(&self, rate: Rate) -> &[Binding] {
        rate.index().map(|i| self.outputs[i].as_slice()).unwrap_or(&[])
    }

    pub fn buffer(&self, stage: ShaderStage) -> &GlslBuffer {
        &self.stages[stage.index()]
    }

    pub(crate) fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.warnings.push(message);
    }

    /// Declare an input; returns its GLSL access name.
    pub fn add_input(&mut self, rate: Rate, key: &Trait, allow_duplicates: bool) -> Result<String> {
        self.add_input_entry(rate, key, allow_duplicates)
            .map(|(name, _)| name)
    }

    /// Like [`Material::add_input`], also returning the rate the input was
    /// stored at (never finer than the trait's uniform default rate).
    pub(crate) fn add_input_entry(
        &mut self,
        rate: Rate,
        key: &Trait,
        allow_duplicates: bool,
    ) -> Result<(String, Rate)> {
        let key = defaults::typed(key)?;
        let default = defaults::default_for(key.id);
        let mut rate = match (rate, default) {
            (Rate::Auto, Some(d)) => d.rate,
            (Rate::Auto, None) => bail!(GenerateError::Config(format!(
                "trait {} has no default rate; an explicit rate is required",
                key.id.name()
            ))),
            (rate, Some(d)) if d.rate.is_uniform() && d.rate < rate => d.rate,
            (rate, _) => rate,
        };
        if key.is_texture() {
            rate = Rate::Renderable;
        }
        let Some(index) = rate.index() else {
            bail!(GenerateError::Config("input rate could not be resolved".to_string()));
        };

        if !allow_duplicates {
            if let Some(existing) = self.inputs[index].iter().find(|b| b.key.same_as(&key)) {
                return Ok((existing.name.clone(), rate));
            }
        }

        let (name, sampler) = if key.is_texture() {
            let slot = self.samplers;
            self.samplers += 1;
            (format!("Texture{slot}"), Some(slot))
        } else {
            let base = if rate.is_uniform() {
                format!("{}.{}", rate.name(), key.id.name())
            } else {
                format!("in{}", key.id.name())
            };
            (unique_name(&self.inputs[index], base), None)
        };
        self.inputs[index].push(Binding {
            key,
            name: name.clone(),
            sampler,
            wired: false,
            location: None,
        });
        Ok((name, rate))
    }

    /// Declare a stage output; only stage-mapped rates are allowed.
    pub fn add_output(&mut self, rate: Rate, key: &Trait, allow_duplicates: bool) -> Result<String> {
        self.add_output_entry(rate, key, allow_duplicates)
            .map(|(name, _)| name)
    }

    pub(crate) fn add_output_entry(
        &mut self,
        rate: Rate,
        key: &Trait,
        allow_duplicates: bool,
    ) -> Result<(String, bool)> {
        let (Some(_), Some(index)) = (rate.stage(), rate.index()) else {
            bail!(GenerateError::Config(format!(
                "output {} requested at rate {}, which is not a shader stage",
                key.id.name(),
                rate.name()
            )));
        };
        let key = defaults::typed(key)?;
        if !allow_duplicates {
            if let Some(existing) = self.outputs[index].iter().find(|b| b.key.same_as(&key)) {
                return Ok((existing.name.clone(), false));
            }
        }
        let name = unique_name(&self.outputs[index], format!("out{}", key.id.name()));
        self.outputs[index].push(Binding {
            key,
            name: name.clone(),
            sampler: None,
            wired: false,
            location: None,
        });
        Ok((name, true))
    }

    /// Give a bridged output and its consuming input the same location.
    ///
    /// An output that already feeds another stage keeps its location; an
    /// input that is already placed is left alone.
    pub(crate) fn link_bridge(&mut self, out_rate: Rate, output: &str, in_rate: Rate, input: &str) {
        let (Some(out_index), Some(in_index)) = (out_rate.index(), in_rate.index()) else {
            return;
        };
        let Some(out_pos) = self.outputs[out_index].iter().position(|b| b.name == output) else {
            return;
        };
        let Some(in_pos) = self.inputs[in_index].iter().position(|b| b.name == input) else {
            return;
        };
        if self.inputs[in_index][in_pos].location.is_some() {
            return;
        }
        let location = match self.outputs[out_index][out_pos].location {
            Some(location) => location,
            None => {
                let slots = location_slots(&self.inputs[in_index][in_pos]);
                let location = self.varyings[in_index];
                self.varyings[in_index] += slots;
                self.outputs[out_index][out_pos].location = Some(location);
                location
            }
        };
        self.inputs[in_index][in_pos].location = Some(location);
    }

    /// Flag an output as assigned by generated code.
    pub fn mark_wired(&mut self, rate: Rate, name: &str) {
        let Some(index) = rate.index() else {
            return;
        };
        if let Some(binding) = self.outputs[index].iter_mut().find(|b| b.name == name) {
            binding.wired = true;
        }
    }

    fn instantiate_stage(&mut self, stage: ShaderStage) -> &mut GlslBuffer {
        let buffer = &mut self.stages[stage.index()];
        if buffer.is_empty() {
            *buffer = GlslBuffer::from_template(stage);
        }
        buffer
    }

    /// Insert `code` at `token` of the stage buffer, creating it on first use.
    pub fn commit(&mut self, stage: ShaderStage, token: Token, code: &str) -> Result<()> {
        if !self.instantiate_stage(stage).insert(token, code) {
            bail!(GenerateError::Config(format!(
                "the {} stage has no {} insertion point",
                stage.name(),
                token.as_str()
            )));
        }
        Ok(())
    }

    pub fn define(&mut self, stage: ShaderStage, text: &str) {
        self.instantiate_stage(stage).define(text);
    }

    /// Commit a helper to `#FUNCTIONS` once per stage.
    pub fn ensure_function(&mut self, stage: ShaderStage, name: &str, body: &str) -> Result<()> {
        if !self.functions.insert((stage, name.to_string())) {
            return Ok(());
        }
        self.commit(stage, Token::Functions, &format!("{}\n", body.trim_end()))
    }

    pub fn has_function(&self, stage: ShaderStage, name: &str) -> bool {
        self.functions.contains(&(stage, name.to_string()))
    }

    /// Run the tree walk and the auto-complete pass. Later calls do nothing.
    pub fn generate(&mut self) -> Result<()> {
        if self.generated {
            return Ok(());
        }
        self.generated = true;
        let root = self.root;
        node_compiler::generate(self, root)?;
        self.auto_complete()
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    fn auto_complete(&mut self) -> Result<()> {
        let nothing_declared = self.outputs.iter().all(Vec::is_empty);
        let pixel_without_output = !self.buffer(ShaderStage::Pixel).is_empty()
            && self.outputs(Rate::Pixel).is_empty();
        if nothing_declared || pixel_without_output {
            log::debug!("no pixel outputs declared, adding the default pixel color");
            self.add_output(
                Rate::Pixel,
                &Trait::typed(TraitId::Color, DataType::Vec4),
                false,
            )?;
        }
        for stage in ShaderStage::ALL {
            self.generate_inputs(stage)?;
            self.generate_outputs(stage)?;
        }
        if self.buffer(ShaderStage::Vertex).find_keyword("gl_Position").is_none() {
            self.commit(ShaderStage::Vertex, Token::Position, FULLSCREEN_VERTEX)?;
        }
        self.generate_uniforms()?;

        let version = self.version;
        for buffer in self.stages.iter_mut().filter(|b| !b.is_empty()) {
            buffer.set_version(version);
        }
        Ok(())
    }

    fn generate_inputs(&mut self, stage: ShaderStage) -> Result<()> {
        let Some(index) = stage.rate().index() else {
            return Ok(());
        };
        let mut lines = Vec::new();
        let locations = assign_locations(&self.inputs[index]);
        for (binding, location) in self.inputs[index].iter().zip(locations) {
            let ty = binding_type(binding)?;
            lines.push(format!("layout(location = {location}) in {ty} {};", binding.name));
        }
        for line in lines {
            self.commit(stage, Token::Input, &line)?;
        }
        Ok(())
    }

    fn generate_outputs(&mut self, stage: ShaderStage) -> Result<()> {
        let Some(index) = stage.rate().index() else {
            return Ok(());
        };
        let bindings = self.outputs[index].clone();
        let locations = assign_locations(&bindings);
        for (binding, location) in bindings.iter().zip(locations) {
            let ty = binding_type(binding)?;
            self.commit(
                stage,
                Token::Output,
                &format!("layout(location = {location}) out {ty} {};", binding.name),
            )?;
            if binding.wired {
                continue;
            }
            let target = binding.key.ty.unwrap_or(DataType::Vec4);
            let value = match self.find_output_source(&binding.key, stage) {
                Some(symbol) => convert_symbol(&symbol.expr, symbol.ty, target, "0.0")?,
                None => {
                    self.warn(format!(
                        "no {} symbol reaches the {} stage output {}; falling back to solid red",
                        binding.key.id.name(),
                        stage.name(),
                        binding.name
                    ));
                    convert_symbol(RED, DataType::Vec4, target, "0.0")?
                }
            };
            self.commit(stage, Token::Colorize, &format!("{} = {value};", binding.name))?;
        }
        Ok(())
    }

    /// Latest producer of `key` usable inside `stage` without a bridge:
    /// node outputs in reverse pre-order, then material inputs.
    fn find_output_source(&self, key: &Trait, stage: ShaderStage) -> Option<Symbol> {
        let limit = stage.rate();
        let admissible = |s: &Symbol| s.rate <= limit && (s.rate.is_uniform() || s.rate == limit);

        let mut order = vec![self.root];
        order.extend(self.subtree(self.root));
        for id in order.into_iter().rev() {
            if let Some((_, symbol)) = self
                .node(id)
                .outputs
                .iter()
                .find(|(t, s)| t.id == key.id && admissible(s))
            {
                return Some(symbol.clone());
            }
        }

        for rate in Rate::UNIFORMS.into_iter().chain(std::iter::once(limit)) {
            for binding in self.inputs(rate) {
                if binding.key.id != key.id || binding.key.is_texture() {
                    continue;
                }
                if let Some(ty) = binding.key.ty {
                    return Some(Symbol::new(binding.name.clone(), ty, rate));
                }
            }
        }
        None
    }

    /// Emit one uniform block per uniform rate that has inputs, and one
    /// sampler per texture, into every stage whose code names them.
    fn generate_uniforms(&mut self) -> Result<()> {
        for rate in Rate::UNIFORMS {
            let (Some(index), Some((set, binding))) = (rate.index(), rate.uniform_binding()) else {
                continue;
            };
            let members: Vec<Binding> = self.inputs[index]
                .iter()
                .filter(|b| !b.key.is_texture())
                .cloned()
                .collect();
            if members.is_empty() {
                continue;
            }
            let mut block = format!(
                "layout(set = {set}, binding = {binding}) uniform UniformBuffer{0} {{\n",
                rate.name()
            );
            for member in &members {
                let ty = binding_type(member)?;
                let field = member.name.rsplit('.').next().unwrap_or(&member.name);
                block.push_str(&format!("    {ty} {field};\n"));
            }
            block.push_str(&format!("}} {};\n", rate.name()));

            for stage in ShaderStage::ALL {
                let buffer = self.buffer(stage);
                if buffer.is_empty() {
                    continue;
                }
                if members.iter().any(|m| buffer.find_keyword(&m.name).is_some()) {
                    self.commit(stage, Token::Uniform, &block)?;
                }
            }
        }

        let Some(index) = Rate::Renderable.index() else {
            return Ok(());
        };
        let samplers: Vec<Binding> = self.inputs[index]
            .iter()
            .filter(|b| b.key.is_texture())
            .cloned()
            .collect();
        for sampler in samplers {
            let slot = sampler.sampler.unwrap_or(0);
            let declaration = format!(
                "layout(set = 2, binding = {slot}) uniform sampler2D {};",
                sampler.name
            );
            for stage in ShaderStage::ALL {
                let buffer = self.buffer(stage);
                if !buffer.is_empty() && buffer.find_keyword(&sampler.name).is_some() {
                    self.commit(stage, Token::Uniform, &declaration)?;
                }
            }
        }
        Ok(())
    }

    /// Compiled stage text without insertion tokens; empty for unused stages.
    pub fn stage_code(&self, stage: ShaderStage) -> String {
        self.buffer(stage).compiled()
    }

    /// Every non-empty stage in pipeline order.
    pub fn stages(&self) -> Vec<(ShaderStage, String)> {
        ShaderStage::ALL
            .into_iter()
            .filter(|&s| !self.buffer(s).is_empty())
            .map(|s| (s, self.stage_code(s)))
            .collect()
    }

    pub fn pretty(&self, stage: ShaderStage) -> String {
        super::glsl::pretty(&self.stage_code(stage))
    }
}

fn unique_name(list: &[Binding], base: String) -> String {
    if !list.iter().any(|b| b.name == base) {
        return base;
    }
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !list.iter().any(|b| &b.name == candidate))
        .unwrap_or(base)
}

/// Interface locations a binding occupies; a matNxN takes one per column.
fn location_slots(binding: &Binding) -> u32 {
    binding
        .key
        .ty
        .and_then(|ty| ty.decay().ok())
        .and_then(DataType::matrix_shape)
        .map(|(_, dim)| dim as u32)
        .unwrap_or(1)
}

/// Declared location per binding: bridged ones keep theirs, the rest
/// follow after the highest bridged slot in list order.
fn assign_locations(bindings: &[Binding]) -> Vec<u32> {
    let mut next = bindings
        .iter()
        .filter_map(|b| b.location.map(|l| l + location_slots(b)))
        .max()
        .unwrap_or(0);
    bindings
        .iter()
        .map(|b| match b.location {
            Some(location) => location,
            None => {
                let location = next;
                next += location_slots(b);
                location
            }
        })
        .collect()
}

fn binding_type(binding: &Binding) -> Result<&'static str> {
    let ty = binding.key.ty.unwrap_or(DataType::Float);
    ty.decay()
        .and_then(DataType::glsl_name)
        .with_context(|| format!("declaring {}", binding.name))
}

fn parse_rate(construct: &Construct) -> Result<Option<Rate>> {
    match dsl::trait_value(construct, TraitId::Rate) {
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| GenerateError::config(format!("invalid Rate trait {value}: {e}"))),
        None => Ok(None),
    }
}

/// The construct minus its node children, which become tree nodes.
fn local_descriptor(construct: &Construct) -> Construct {
    Construct {
        kind: construct.kind,
        name: construct.name.clone(),
        traits: construct.traits.clone(),
        verbs: construct.verbs.clone(),
        children: construct
            .children
            .iter()
            .filter(|c| !c.kind.is_node())
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn color() -> Trait {
        Trait::typed(TraitId::Color, DataType::Vec4)
    }

    #[test]
    fn uniform_rates_clamp_and_name_block_members() {
        let mut mat = Material::new(Rate::Pixel);
        let name = mat.add_input(Rate::Pixel, &Trait::new(TraitId::Time), false).unwrap();
        assert_eq!(name, "Tick.Time");
        assert_eq!(mat.inputs(Rate::Tick).len(), 1);
        assert!(mat.inputs(Rate::Pixel).is_empty());

        let auto = mat.add_input(Rate::Auto, &Trait::new(TraitId::View), false).unwrap();
        assert_eq!(auto, "Camera.View");
        let attribute = mat.add_input(Rate::Vertex, &Trait::new(TraitId::Position), false).unwrap();
        assert_eq!(attribute, "inPosition");
    }

    #[test]
    fn inputs_and_outputs_deduplicate_per_rate() {
        let mut mat = Material::new(Rate::Pixel);
        let a = mat.add_input(Rate::Vertex, &color(), false).unwrap();
        let b = mat.add_input(Rate::Vertex, &color(), false).unwrap();
        assert_eq!(a, b);
        assert_eq!(mat.inputs(Rate::Vertex).len(), 1);

        let c = mat.add_input(Rate::Pixel, &color(), false).unwrap();
        assert_eq!(c, "inColor");
        assert_eq!(mat.inputs(Rate::Pixel).len(), 1);

        let d = mat.add_input(Rate::Vertex, &color(), true).unwrap();
        assert_eq!(d, "inColor1");
        assert_eq!(mat.inputs(Rate::Vertex).len(), 2);

        let o1 = mat.add_output(Rate::Pixel, &color(), false).unwrap();
        let o2 = mat.add_output(Rate::Pixel, &color(), false).unwrap();
        assert_eq!(o1, "outColor");
        assert_eq!(o1, o2);
        assert_eq!(mat.outputs(Rate::Pixel).len(), 1);
    }

    #[test]
    fn textures_get_unique_sampler_slots() {
        let mut mat = Material::new(Rate::Pixel);
        let texture = Trait::new(TraitId::Texture);
        assert_eq!(mat.add_input(Rate::Pixel, &texture, true).unwrap(), "Texture0");
        assert_eq!(mat.add_input(Rate::Pixel, &texture, true).unwrap(), "Texture1");
        assert_eq!(mat.add_input(Rate::Pixel, &texture, false).unwrap(), "Texture0");
        let slots: Vec<_> = mat.inputs(Rate::Renderable).iter().map(|b| b.sampler).collect();
        assert_eq!(slots, vec![Some(0), Some(1)]);
    }

    #[test]
    fn outputs_require_a_stage_rate() {
        let mut mat = Material::new(Rate::Pixel);
        for rate in std::iter::once(Rate::Auto).chain(Rate::UNIFORMS) {
            let err = mat.add_output(rate, &color(), false).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<GenerateError>(), Some(GenerateError::Config(_))),
                "{rate:?} accepted an output"
            );
        }
        for stage in ShaderStage::ALL {
            assert!(mat.add_output(stage.rate(), &color(), false).is_ok());
        }
    }

    #[test]
    fn unbridged_bindings_follow_the_bridged_slots() {
        let binding = |name: &str, ty: DataType, location: Option<u32>| Binding {
            key: Trait::typed(TraitId::Color, ty),
            name: name.to_string(),
            sampler: None,
            wired: false,
            location,
        };
        let list = vec![
            binding("inColor", DataType::Vec4, None),
            binding("inModel", DataType::Mat4, Some(1)),
            binding("inAim", DataType::Vec3, Some(0)),
            binding("inDepth", DataType::Float, None),
        ];
        assert_eq!(assign_locations(&list), vec![5, 1, 0, 6]);
    }

    #[test]
    fn ensure_function_commits_once() {
        let mut mat = Material::new(Rate::Pixel);
        mat.ensure_function(ShaderStage::Pixel, "Helper", "float Helper() { return 1.0; }")
            .unwrap();
        mat.ensure_function(ShaderStage::Pixel, "Helper", "float Helper() { return 1.0; }")
            .unwrap();
        assert_eq!(mat.buffer(ShaderStage::Pixel).as_str().matches("float Helper()").count(), 1);
        assert!(mat.has_function(ShaderStage::Pixel, "Helper"));
        assert!(!mat.has_function(ShaderStage::Vertex, "Helper"));
    }

    #[test]
    fn empty_material_gets_red_pixel_and_fullscreen_vertex() {
        let mut mat = Material::new(Rate::Pixel);
        mat.generate().unwrap();

        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.starts_with("#version 450\n"));
        assert_eq!(pixel.matches("layout(location = 0) out vec4 outColor;").count(), 1);
        assert!(pixel.contains("outColor = vec4(1.0, 0.0, 0.0, 1.0);"));
        assert_eq!(mat.warnings().len(), 1);

        let vertex = mat.stage_code(ShaderStage::Vertex);
        assert!(vertex.contains("gl_Position = vec4(fullscreen * 2.0 - 1.0, 0.0, 1.0);"));
        assert!(!vertex.contains("uniform"));

        assert_eq!(mat.stages().len(), 2);
        assert!(mat.stage_code(ShaderStage::Compute).is_empty());

        // Generation runs once.
        let before = mat.stage_code(ShaderStage::Pixel);
        mat.generate().unwrap();
        assert_eq!(mat.stage_code(ShaderStage::Pixel), before);
    }

    #[test]
    fn uniform_blocks_only_land_in_stages_that_use_them() {
        let mut mat = Material::new(Rate::Pixel);
        let time = mat.add_input(Rate::Auto, &Trait::new(TraitId::Time), false).unwrap();
        mat.add_input(Rate::Auto, &Trait::new(TraitId::MousePosition), false)
            .unwrap();
        mat.commit(ShaderStage::Pixel, Token::Texturize, &format!("float t = {time};"))
            .unwrap();
        mat.generate().unwrap();

        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains(
            "layout(set = 0, binding = 0) uniform UniformBufferTick {\n    float Time;\n    vec2 MousePosition;\n} Tick;"
        ));
        assert!(!mat.stage_code(ShaderStage::Vertex).contains("UniformBufferTick"));
    }

    #[test]
    fn commit_to_a_missing_token_is_a_configuration_error() {
        let mut mat = Material::new(Rate::Pixel);
        let err = mat
            .commit(ShaderStage::Pixel, Token::Position, "gl_Position = vec4(0.0);")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::Config(_))
        ));
    }

    proptest! {
        #[test]
        fn stored_input_rate_never_exceeds_the_trait_default(
            rate in prop::sample::select(Rate::ALL.to_vec()),
            id in prop::sample::select(vec![
                TraitId::Time,
                TraitId::MousePosition,
                TraitId::Resolution,
                TraitId::Projection,
                TraitId::View,
                TraitId::Model,
            ]),
        ) {
            let mut mat = Material::new(Rate::Pixel);
            let (_, stored) = mat.add_input_entry(rate, &Trait::new(id), false).unwrap();
            prop_assert!(stored <= rate);
            let default = defaults::default_for(id).unwrap().rate;
            prop_assert!(stored <= default);
        }
    }
}
