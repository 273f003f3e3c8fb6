//! Node tree storage, hierarchy search and cross-rate bridging.
//!
//! Nodes live in an arena owned by the [`Material`]; parents own their
//! children through ordered id lists and children keep a plain parent id.

use anyhow::{Result, bail};

use super::convert::convert_symbol;
use super::defaults;
use super::error::GenerateError;
use super::glsl::Token;
use super::material::Material;
use super::node_compiler::{self, NodeKind};
use super::types::{DataType, Rate, ShaderStage, Symbol, Trait};
use crate::dsl::Construct;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a symbol lookup does when nothing in the hierarchy matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fallback {
    /// Fail with a configuration error.
    Required,
    /// Declare a material input for the trait (bridging from an earlier
    /// stage when the trait's default rate is one).
    Input,
    /// Log a warning and return `None`.
    Soft,
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub name: Option<String>,
    pub rate: Rate,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Exposed outputs, unique per trait id, in declaration order.
    pub outputs: Vec<(Trait, Symbol)>,
    pub generated: bool,
    /// Traits, verbs and data constructs this node was built from.
    pub descriptor: Construct,
}

impl Material {
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        name: Option<String>,
        rate: Rate,
        descriptor: Construct,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            name,
            rate,
            parent: None,
            children: Vec::new(),
            outputs: Vec::new(),
            generated: false,
            descriptor,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name.as_deref() == Some(name))
            .map(NodeId)
    }

    /// Attach `child` under `parent`, detaching it from its previous parent.
    ///
    /// Self-attachment and attaching an ancestor of `parent` are rejected;
    /// attaching an existing child again is a no-op.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if parent == child {
            bail!(GenerateError::Config(format!(
                "node {} cannot be its own child",
                child.0
            )));
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                bail!(GenerateError::Config(format!(
                    "attaching node {} under node {} would create a cycle",
                    child.0, parent.0
                )));
            }
            cursor = self.node(id).parent;
        }
        if self.node(parent).children.contains(&child) {
            return Ok(());
        }
        if let Some(old) = self.node(child).parent {
            self.remove_child(old, child);
        }
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
        Ok(())
    }

    /// Detach `child` from `parent`. Returns `false` when it was not a child.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let children = &mut self.node_mut(parent).children;
        let Some(pos) = children.iter().position(|&c| c == child) else {
            return false;
        };
        children.remove(pos);
        self.node_mut(child).parent = None;
        true
    }

    /// First stage-mapped rate found walking from `id` up to the root.
    pub fn get_stage(&self, id: NodeId) -> Option<ShaderStage> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current);
            if let Some(stage) = node.rate.stage() {
                return Some(stage);
            }
            cursor = node.parent;
        }
        None
    }

    pub fn node_stage(&self, id: NodeId) -> Result<ShaderStage> {
        self.get_stage(id).ok_or_else(|| {
            GenerateError::config(format!(
                "node {} ({}) has no shader stage in its ancestry",
                id.0,
                self.node(id).kind.name()
            ))
        })
    }

    /// Mark `id` generated and generate its children in order.
    pub fn descend(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id).generated = true;
        let children = self.node(id).children.clone();
        for child in children {
            node_compiler::generate(self, child)?;
        }
        Ok(())
    }

    /// Bind `symbol` as this node's output for the trait, replacing an
    /// earlier binding of the same trait id.
    pub fn expose(&mut self, id: NodeId, key: Trait, symbol: Symbol) {
        let outputs = &mut self.node_mut(id).outputs;
        match outputs.iter_mut().find(|(t, _)| t.id == key.id) {
            Some(slot) => *slot = (key, symbol),
            None => outputs.push((key, symbol)),
        }
    }

    /// Direct children of `id` that are Scene nodes.
    pub fn scene_children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(|&c| matches!(self.node(c).kind, NodeKind::Scene(_)))
            .collect()
    }

    /// Every node below `id` (excluding `id`), pre-order.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.node(current).children.iter().rev().copied());
        }
        out
    }

    /// Nodes whose outputs are visible from `id`, in lookup priority order.
    ///
    /// The node itself, then for each level up the tree: preceding siblings
    /// (nearest first), the parent, then the subtrees of those preceding
    /// siblings.
    pub fn search_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = vec![id];
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            let siblings = &self.node(parent).children;
            let pos = siblings
                .iter()
                .position(|&c| c == current)
                .unwrap_or(siblings.len());
            let preceding: Vec<NodeId> = siblings[..pos].iter().rev().copied().collect();
            order.extend(preceding.iter().copied());
            order.push(parent);
            for sibling in preceding {
                order.extend(self.subtree(sibling));
            }
            current = parent;
        }
        order
    }

    /// First exposed symbol matching `key` at or below `rate`, searching
    /// from `from` in [`Material::search_order`].
    pub fn find_value(&self, from: NodeId, key: &Trait, rate: Rate) -> Option<Symbol> {
        self.search_order(from).into_iter().find_map(|id| {
            self.node(id)
                .outputs
                .iter()
                .find(|(t, s)| t.same_as(key) && s.rate <= rate)
                .map(|(_, s)| s.clone())
        })
    }

    fn resolve_rate(&self, from: NodeId, rate: Rate) -> Rate {
        if rate != Rate::Auto {
            return rate;
        }
        self.get_stage(from)
            .map(ShaderStage::rate)
            .unwrap_or(self.default_rate())
    }

    /// Resolve `key` for a consumer at `rate`, bridging across stages when
    /// the producer lives in an earlier one.
    pub fn get_value(
        &mut self,
        from: NodeId,
        key: &Trait,
        rate: Rate,
        fallback: Fallback,
    ) -> Result<Option<Symbol>> {
        let rate = self.resolve_rate(from, rate);
        if let Some(symbol) = self.find_value(from, key, rate) {
            return self.bridge(key, symbol, rate).map(Some);
        }
        match fallback {
            Fallback::Required => bail!(GenerateError::Config(format!(
                "no {} symbol at rate {} is visible from node {} ({})",
                key.id.name(),
                rate.name(),
                from.0,
                self.node(from).kind.name()
            ))),
            Fallback::Soft => {
                self.warn(format!(
                    "no {} symbol at rate {} is visible from node {} ({})",
                    key.id.name(),
                    rate.name(),
                    from.0,
                    self.node(from).kind.name()
                ));
                Ok(None)
            }
            Fallback::Input => self.input_symbol(key, rate).map(Some),
        }
    }

    /// [`Material::get_value`] followed by a rank conversion to `ty`.
    pub fn get_value_as(
        &mut self,
        from: NodeId,
        key: &Trait,
        rate: Rate,
        ty: DataType,
        fallback: Fallback,
    ) -> Result<Option<String>> {
        match self.get_value(from, key, rate, fallback)? {
            Some(symbol) => convert_symbol(&symbol.expr, symbol.ty, ty, "0.0").map(Some),
            None => Ok(None),
        }
    }

    /// Carry a stage-rate symbol into a later stage through an output/input
    /// pair. Uniform symbols and same-stage symbols pass through unchanged.
    fn bridge(&mut self, key: &Trait, symbol: Symbol, rate: Rate) -> Result<Symbol> {
        let (Some(producer), Some(_)) = (symbol.rate.stage(), rate.stage()) else {
            return Ok(symbol);
        };
        if symbol.rate == rate || symbol.ty.is_texture() {
            return Ok(symbol);
        }
        let ty = symbol.ty.decay()?;
        let carried = Trait::typed(key.id, ty);
        let (out, created) = self.add_output_entry(symbol.rate, &carried, false)?;
        if created {
            self.commit(producer, Token::Colorize, &format!("{out} = {};", symbol.expr))?;
            self.mark_wired(symbol.rate, &out);
            log::debug!(
                "bridged {} from {} to {} as {out}",
                key.id.name(),
                symbol.rate.name(),
                rate.name()
            );
        }
        let (input, stored) = self.add_input_entry(rate, &carried, false)?;
        self.link_bridge(symbol.rate, &out, stored, &input);
        Ok(Symbol::new(input, ty, stored))
    }

    /// Declare `key` as a material input usable at `rate`.
    fn input_symbol(&mut self, key: &Trait, rate: Rate) -> Result<Symbol> {
        let typed = defaults::typed(key)?;
        let ty = typed.ty.unwrap_or(DataType::Float);
        let default_rate = defaults::default_for(key.id).map(|d| d.rate).unwrap_or(rate);

        if default_rate.is_uniform() || typed.is_texture() {
            let (name, stored) = self.add_input_entry(default_rate, &typed, false)?;
            return Ok(Symbol::new(name, ty, stored));
        }
        if default_rate < rate && default_rate.stage().is_some() && rate.stage().is_some() {
            let (attribute, stored) = self.add_input_entry(default_rate, &typed, false)?;
            return self.bridge(&typed, Symbol::new(attribute, ty, stored), rate);
        }
        let (name, stored) = self.add_input_entry(rate, &typed, false)?;
        Ok(Symbol::new(name, ty, stored))
    }
}
