//! Assembly structure recovered from representation relationships.
//!
//! Representations linked by a plain `SHAPE_REPRESENTATION_RELATIONSHIP`
//! describe the same product and are merged into one node. Relationships
//! carrying an `ITEM_DEFINED_TRANSFORMATION` place a child node inside a
//! parent node, and so does a `MAPPED_ITEM` inside a representation. Which
//! side of a relationship is the parent comes from the product structure
//! (`CONTEXT_DEPENDENT_SHAPE_REPRESENTATION` to its
//! `NEXT_ASSEMBLY_USAGE_OCCURRENCE`) when the file has one. Nodes that are
//! never placed become roots, and every path from a root to a node holding
//! solids yields one solid occurrence with the placement accumulated along
//! that path.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use stepglb_kernel_math::Placement;

use crate::entities::{ref_at, refs_at, string_at, EntityIndex, StepEntity};

/// Deepest assembly nesting followed before a branch is abandoned.
const MAX_DEPTH: usize = 64;

/// A solid placed by an assembly path.
#[derive(Debug, Clone, PartialEq)]
pub struct SolidOccurrence {
    /// Shell entity id of the solid.
    pub shell: u64,
    /// Product name of the placed part, or the solid's own name.
    pub name: Option<String>,
    /// Placement relative to the root, kernel units.
    pub location: Placement,
}

/// A root product and every solid occurrence beneath it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRoot {
    /// Lowest representation id of the root node.
    pub representation: u64,
    /// Product or representation name.
    pub name: Option<String>,
    /// Occurrences in traversal order.
    pub occurrences: Vec<SolidOccurrence>,
}

/// A shell that no representation places.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LooseShell {
    /// Shell entity id.
    pub shell: u64,
    /// Name of a solid bounded by the shell, if any.
    pub name: Option<String>,
}

/// Roots in representation-id order, followed by loose shells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyTree {
    /// Root products.
    pub roots: Vec<AssemblyRoot>,
    /// Shells reached by no root.
    pub loose_shells: Vec<LooseShell>,
}

#[derive(Debug, Clone)]
struct SolidItem {
    shell: u64,
    name: Option<String>,
}

/// How a placement edge is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    /// `parent` places `child`.
    AsWritten,
    /// The product structure names `child` as the assembly.
    Reversed,
    /// No product structure; read as written.
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct Placed {
    /// Relationship or mapped item the edge comes from.
    source: u64,
    parent: u64,
    child: u64,
    transform: Placement,
    orientation: Orientation,
}

impl Placed {
    fn flipped(&self) -> (u64, u64, Placement) {
        (
            self.child,
            self.parent,
            self.transform.inverse().unwrap_or_default(),
        )
    }
}

type Children = BTreeMap<u64, Vec<(u64, Placement)>>;

/// Build the assembly tree. `shells` lists the shell ids the kernel can mesh.
pub fn build(index: &EntityIndex, shells: &[u64]) -> AssemblyTree {
    let known: BTreeSet<u64> = shells.iter().copied().collect();

    let (links, mut placed) = relationships(index);

    let mut rep_names: HashMap<u64, String> = HashMap::new();
    let mut rep_solids: HashMap<u64, Vec<SolidItem>> = HashMap::new();
    for entity in index.entities_where(is_representation) {
        let Some(record) = entity
            .records
            .iter()
            .find(|r| is_representation(&r.type_name) && r.args.len() >= 2)
        else {
            continue;
        };
        if let Some(name) = string_at(&record.args, 0) {
            rep_names.insert(entity.id, name.to_string());
        }
        let items: Vec<&StepEntity> = refs_at(&record.args, 1)
            .into_iter()
            .filter_map(|item| index.get(item))
            .collect();
        placed.extend(
            items
                .iter()
                .filter(|item| item.is("MAPPED_ITEM"))
                .filter_map(|item| mapped_item(index, entity.id, item)),
        );
        let solids: Vec<SolidItem> = items
            .into_iter()
            .flat_map(solid_items)
            .filter(|solid| {
                let meshable = known.contains(&solid.shell);
                if !meshable {
                    tracing::debug!(shell = solid.shell, "solid bounded by an unreadable shell");
                }
                meshable
            })
            .collect();
        rep_solids.insert(entity.id, solids);
    }

    let mut groups = UnionFind::default();
    for &rep in rep_solids.keys() {
        groups.insert(rep);
    }
    for &(a, b) in &links {
        groups.union(a, b);
    }
    for p in &placed {
        groups.insert(p.parent);
        groups.insert(p.child);
    }

    let mut node_solids: BTreeMap<u64, Vec<SolidItem>> = BTreeMap::new();
    let mut reps: Vec<u64> = rep_solids.keys().copied().collect();
    reps.sort_unstable();
    for rep in &reps {
        let node = groups.find(*rep);
        node_solids
            .entry(node)
            .or_default()
            .extend(rep_solids[rep].iter().cloned());
    }

    let product_names = product_names(index);
    let mut node_names: HashMap<u64, String> = HashMap::new();
    for rep in &reps {
        let node = groups.find(*rep);
        if let Some(name) = product_names.get(rep) {
            node_names.entry(node).or_insert_with(|| name.clone());
        }
    }
    let mut fallback_names: HashMap<u64, String> = HashMap::new();
    for rep in &reps {
        if let Some(name) = rep_names.get(rep) {
            fallback_names
                .entry(groups.find(*rep))
                .or_insert_with(|| name.clone());
        }
    }

    let mut node_definitions: HashMap<u64, u64> = HashMap::new();
    let mut defined: Vec<(u64, u64)> = representation_definitions(index).into_iter().collect();
    defined.sort_unstable();
    for (rep, definition) in defined {
        node_definitions
            .entry(groups.find(rep))
            .or_insert(definition);
    }
    let usages = assembly_usages(index);

    let node_edges: Vec<Placed> = placed
        .iter()
        .map(|p| {
            let parent = groups.find(p.parent);
            let child = groups.find(p.child);
            let orientation = match (p.orientation, usages.get(&p.source)) {
                (Orientation::Unknown, Some(usage)) => {
                    usage.orient(node_definitions.get(&parent), node_definitions.get(&child))
                }
                (orientation, _) => orientation,
            };
            Placed {
                parent,
                child,
                orientation,
                ..*p
            }
        })
        .filter(|p| p.parent != p.child)
        .collect();
    let children = orient_edges(&node_edges);

    let placed_children: BTreeSet<u64> = children
        .values()
        .flat_map(|c| c.iter().map(|(child, _)| *child))
        .collect();
    let mut root_nodes: BTreeSet<u64> = children
        .keys()
        .filter(|n| !placed_children.contains(*n))
        .copied()
        .collect();
    root_nodes.extend(
        node_solids
            .iter()
            .filter(|(n, solids)| !solids.is_empty() && !placed_children.contains(*n))
            .map(|(n, _)| *n),
    );

    let walker = Walker {
        children: &children,
        solids: &node_solids,
        names: &node_names,
    };

    let mut tree = AssemblyTree::default();
    let mut used: BTreeSet<u64> = BTreeSet::new();
    for root in root_nodes {
        let mut occurrences = Vec::new();
        let mut path = Vec::new();
        walker.visit(root, Placement::identity(), &mut path, &mut occurrences);
        used.extend(occurrences.iter().map(|o| o.shell));
        tree.roots.push(AssemblyRoot {
            representation: root,
            name: node_names
                .get(&root)
                .or_else(|| fallback_names.get(&root))
                .cloned(),
            occurrences,
        });
    }

    let solid_names = solid_names(index);
    tree.loose_shells = known
        .iter()
        .filter(|shell| !used.contains(*shell))
        .map(|&shell| LooseShell {
            shell,
            name: solid_names.get(&shell).cloned(),
        })
        .collect();

    tracing::debug!(
        representations = reps.len(),
        links = links.len(),
        placements = placed.len(),
        roots = tree.roots.len(),
        loose = tree.loose_shells.len(),
        "assembly structure"
    );
    tree
}

struct Walker<'a> {
    children: &'a Children,
    solids: &'a BTreeMap<u64, Vec<SolidItem>>,
    names: &'a HashMap<u64, String>,
}

impl Walker<'_> {
    fn visit(
        &self,
        node: u64,
        location: Placement,
        path: &mut Vec<u64>,
        out: &mut Vec<SolidOccurrence>,
    ) {
        if path.contains(&node) || path.len() >= MAX_DEPTH {
            tracing::warn!(node, depth = path.len(), "assembly cycle or excessive nesting");
            return;
        }
        path.push(node);

        for solid in self.solids.get(&node).into_iter().flatten() {
            out.push(SolidOccurrence {
                shell: solid.shell,
                name: self.names.get(&node).cloned().or_else(|| solid.name.clone()),
                location,
            });
        }
        for (child, transform) in self.children.get(&node).into_iter().flatten() {
            self.visit(*child, location.then(transform), path, out);
        }

        path.pop();
    }
}

fn is_representation(type_name: &str) -> bool {
    type_name.ends_with("REPRESENTATION")
        && !type_name.ends_with("DEFINITION_REPRESENTATION")
        && type_name != "CONTEXT_DEPENDENT_SHAPE_REPRESENTATION"
}

/// Solids a representation item stands for, as (shell, name) pairs.
fn solid_items(item: &StepEntity) -> Vec<SolidItem> {
    let args = item.args();
    let name = string_at(args, 0).map(str::to_string);
    match item.type_name() {
        "MANIFOLD_SOLID_BREP" | "BREP_WITH_VOIDS" | "FACETED_BREP" => ref_at(args, 1)
            .map(|shell| SolidItem { shell, name })
            .into_iter()
            .collect(),
        "SHELL_BASED_SURFACE_MODEL" => refs_at(args, 1)
            .into_iter()
            .map(|shell| SolidItem {
                shell,
                name: name.clone(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Transform-free links and transformed placements, as `(rep_1, rep_2)`
/// pairs and `rep_2 -> rep_1` placements.
fn relationships(index: &EntityIndex) -> (Vec<(u64, u64)>, Vec<Placed>) {
    let mut links = Vec::new();
    let mut placed = Vec::new();

    let is_relationship = |t: &str| {
        t.ends_with("REPRESENTATION_RELATIONSHIP")
            || t == "REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION"
    };
    for entity in index.entities_where(is_relationship) {
        let with_transform = entity.record("REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION");
        let (reps, operator) = match with_transform {
            // simple instance carrying all five attributes itself
            Some(record) if record.args.len() >= 5 => (
                (ref_at(&record.args, 2), ref_at(&record.args, 3)),
                ref_at(&record.args, 4),
            ),
            Some(record) => {
                let base = entity
                    .record("REPRESENTATION_RELATIONSHIP")
                    .or_else(|| entity.record("SHAPE_REPRESENTATION_RELATIONSHIP"));
                let reps = base
                    .map(|b| (ref_at(&b.args, 2), ref_at(&b.args, 3)))
                    .unwrap_or((None, None));
                (reps, ref_at(&record.args, 0))
            }
            None => {
                let base = entity
                    .records
                    .iter()
                    .find(|r| r.type_name.ends_with("REPRESENTATION_RELATIONSHIP"));
                let reps = base
                    .map(|b| (ref_at(&b.args, 2), ref_at(&b.args, 3)))
                    .unwrap_or((None, None));
                (reps, None)
            }
        };

        let (Some(rep_1), Some(rep_2)) = reps else {
            continue;
        };
        match operator {
            Some(op) => placed.push(Placed {
                source: entity.id,
                parent: rep_2,
                child: rep_1,
                transform: item_transform(index, op),
                orientation: Orientation::Unknown,
            }),
            None if with_transform.is_none() => links.push((rep_1, rep_2)),
            None => tracing::debug!(id = entity.id, "transformed relationship without operator"),
        }
    }

    (links, placed)
}

/// `MAPPED_ITEM(name, REPRESENTATION_MAP(origin, rep), target)` inside
/// `parent`: places `rep` with its `origin` frame moved onto `target`.
fn mapped_item(index: &EntityIndex, parent: u64, item: &StepEntity) -> Option<Placed> {
    let record = item.record("MAPPED_ITEM")?;
    let map = ref_at(&record.args, 1)
        .and_then(|id| index.get(id))
        .and_then(|e| e.record("REPRESENTATION_MAP"));
    let Some(map) = map else {
        tracing::debug!(id = item.id, "mapped item without representation map");
        return None;
    };
    let child = ref_at(&map.args, 1)?;
    let origin = ref_at(&map.args, 0)
        .and_then(|r| index.axis_placement(r))
        .unwrap_or_default();
    let target = match ref_at(&record.args, 2).map(|r| (r, index.axis_placement(r))) {
        Some((_, Some(target))) => target,
        Some((id, None)) => {
            tracing::debug!(id, "unsupported mapping target, using identity");
            Placement::identity()
        }
        None => Placement::identity(),
    };
    Some(Placed {
        source: item.id,
        parent,
        child,
        transform: target.then(&origin.inverse().unwrap_or_default()),
        orientation: Orientation::AsWritten,
    })
}

/// `ITEM_DEFINED_TRANSFORMATION`: maps `transform_item_1` onto
/// `transform_item_2`, i.e. `t2 * t1^-1`.
fn item_transform(index: &EntityIndex, id: u64) -> Placement {
    let Some(record) = index
        .get(id)
        .and_then(|e| e.record("ITEM_DEFINED_TRANSFORMATION"))
    else {
        tracing::debug!(id, "unsupported transformation operator, using identity");
        return Placement::identity();
    };
    let t1 = ref_at(&record.args, 2)
        .and_then(|r| index.axis_placement(r))
        .unwrap_or_default();
    let t2 = ref_at(&record.args, 3)
        .and_then(|r| index.axis_placement(r))
        .unwrap_or_default();
    t2.then(&t1.inverse().unwrap_or_default())
}

/// Parent to children map. Reversed edges are flipped with inverted
/// transforms; relationships without product structure are read as written,
/// with `rep_2` placing `rep_1`.
fn orient_edges(edges: &[Placed]) -> Children {
    let mut children = Children::new();
    for e in edges {
        let (parent, child, transform) = match e.orientation {
            Orientation::Reversed => e.flipped(),
            Orientation::AsWritten | Orientation::Unknown => (e.parent, e.child, e.transform),
        };
        children.entry(parent).or_default().push((child, transform));
    }
    let reversed = edges
        .iter()
        .filter(|e| e.orientation == Orientation::Reversed)
        .count();
    if reversed > 0 {
        tracing::debug!(reversed, "relationships written child-first");
    }
    children
}

/// Which product definitions an assembly usage joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Usage {
    assembly: u64,
    component: u64,
}

impl Usage {
    /// Orientation of an edge whose ends belong to the given definitions.
    fn orient(&self, parent: Option<&u64>, child: Option<&u64>) -> Orientation {
        let (parent, child) = (parent.copied(), child.copied());
        if parent == Some(self.assembly) || child == Some(self.component) {
            Orientation::AsWritten
        } else if parent == Some(self.component) || child == Some(self.assembly) {
            Orientation::Reversed
        } else {
            Orientation::Unknown
        }
    }
}

/// Relationship id to the assembly usage it realises, along
/// `CONTEXT_DEPENDENT_SHAPE_REPRESENTATION -> PRODUCT_DEFINITION_SHAPE ->
/// NEXT_ASSEMBLY_USAGE_OCCURRENCE`.
fn assembly_usages(index: &EntityIndex) -> HashMap<u64, Usage> {
    let mut usages = HashMap::new();
    for cdsr in index.entities_of_type("CONTEXT_DEPENDENT_SHAPE_REPRESENTATION") {
        let Some(relationship) = ref_at(cdsr.args(), 0) else {
            continue;
        };
        let usage = ref_at(cdsr.args(), 1)
            .and_then(|pds| index.get(pds))
            .and_then(|pds| ref_at(pds.args(), 2))
            .and_then(|nauo| index.get(nauo))
            .filter(|nauo| nauo.type_name().ends_with("USAGE_OCCURRENCE"))
            .and_then(|nauo| {
                Some(Usage {
                    assembly: ref_at(nauo.args(), 3)?,
                    component: ref_at(nauo.args(), 4)?,
                })
            });
        match usage {
            Some(usage) => {
                usages.insert(relationship, usage);
            }
            None => tracing::debug!(id = cdsr.id, "context dependent shape without usage"),
        }
    }
    usages
}

/// Representation id to its product definition, along
/// `SHAPE_DEFINITION_REPRESENTATION -> PRODUCT_DEFINITION_SHAPE`.
fn representation_definitions(index: &EntityIndex) -> HashMap<u64, u64> {
    let mut definitions = HashMap::new();
    for sdr in index.entities_of_type("SHAPE_DEFINITION_REPRESENTATION") {
        let definition = ref_at(sdr.args(), 0)
            .and_then(|pds| index.get(pds))
            .filter(|pds| pds.is("PRODUCT_DEFINITION_SHAPE"))
            .and_then(|pds| ref_at(pds.args(), 2));
        if let (Some(rep), Some(definition)) = (ref_at(sdr.args(), 1), definition) {
            definitions.entry(rep).or_insert(definition);
        }
    }
    definitions
}

/// Representation id to product name along
/// `SHAPE_DEFINITION_REPRESENTATION -> PRODUCT_DEFINITION_SHAPE ->
/// PRODUCT_DEFINITION -> PRODUCT_DEFINITION_FORMATION -> PRODUCT`.
fn product_names(index: &EntityIndex) -> HashMap<u64, String> {
    let follow = |id: Option<u64>, at: usize| {
        let entity = index.get(id?)?;
        ref_at(entity.args(), at)
    };

    let mut names = HashMap::new();
    for sdr in index.entities_of_type("SHAPE_DEFINITION_REPRESENTATION") {
        let Some(rep) = ref_at(sdr.args(), 1) else {
            continue;
        };
        let definition = follow(ref_at(sdr.args(), 0), 2);
        let formation = follow(definition, 2);
        let product = follow(formation, 2);
        let name = product
            .and_then(|p| index.get(p))
            .filter(|p| p.is("PRODUCT"))
            .and_then(|p| string_at(p.args(), 1).or_else(|| string_at(p.args(), 0)));
        if let Some(name) = name {
            names.entry(rep).or_insert_with(|| name.to_string());
        }
    }
    names
}

/// Shell id to the name of the first solid it bounds.
fn solid_names(index: &EntityIndex) -> HashMap<u64, String> {
    let mut names = HashMap::new();
    for kind in ["MANIFOLD_SOLID_BREP", "BREP_WITH_VOIDS", "FACETED_BREP"] {
        for solid in index.entities_of_type(kind) {
            if let (Some(shell), Some(name)) = (ref_at(solid.args(), 1), string_at(solid.args(), 0)) {
                names.entry(shell).or_insert_with(|| name.to_string());
            }
        }
    }
    names
}

/// Disjoint sets keyed by entity id; the smallest id represents its set.
#[derive(Debug, Default)]
struct UnionFind {
    parent: HashMap<u64, u64>,
}

impl UnionFind {
    fn insert(&mut self, id: u64) {
        self.parent.entry(id).or_insert(id);
    }

    fn find(&mut self, id: u64) -> u64 {
        self.insert(id);
        let mut root = id;
        while self.parent[&root] != root {
            root = self.parent[&root];
        }
        let mut cur = id;
        while cur != root {
            let next = self.parent[&cur];
            self.parent.insert(cur, root);
            cur = next;
        }
        root
    }

    fn union(&mut self, a: u64, b: u64) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent.insert(ra.max(rb), ra.min(rb));
        }
    }
}
