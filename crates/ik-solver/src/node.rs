//! Dirty-propagating transform tree, stored as an arena of `u32`-indexed
//! nodes rather than the reference's refcounted parent/child graph.
//!
//! The reference implementation (`IKTransform3D`) gives every node a
//! `Ref<IKTransform3D>` parent pointer and a `Vector<Ref<IKTransform3D>>`
//! child list, which in a GC'd/refcounted host is fine but in Rust would
//! mean either `Rc<RefCell<_>>` cycles or unsafe back-pointers. An arena of
//! plain structs addressed by index sidesteps both: parent/child links are
//! just `u32`s, the whole tree lives in one `Vec`, and there is nothing to
//! leak or cycle.

use ik_core::math::Transform;
use glam::Vec3;

/// Index of a node within a [`NodeArena`].
pub type NodeId = u32;

/// Which cached fields of a node are stale.
///
/// The reference's `IKTransform3D` tracks this as a three-bit flag set
/// (`LOCAL`/`GLOBAL`/`VECTORS`); plain bools read just as clearly here and
/// match how the rest of this workspace tracks dirty state (see e.g.
/// `VisualGraphEditor::is_dirty`), so there's no bitflag type to pull in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Dirty {
    /// The cached global transform is stale and must be recomposed.
    global: bool,
    /// Cached derived vectors (e.g. a basis direction) are stale.
    vectors: bool,
}

struct Node {
    local: Transform,
    global: Transform,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    dirty: Dirty,
    disable_scale: bool,
    /// +1.0 or -1.0; see [`NodeArena::set_chirality`].
    chirality: f32,
}

/// An arena of [`IKNode3D`]-equivalent transform nodes.
///
/// All solver components that previously held an `IKNode3D` instead hold a
/// `NodeId` into a shared `NodeArena`.
#[derive(Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Create a new root node (no parent) with the given local transform.
    pub fn create_root(&mut self, local: Transform) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            local,
            global: local,
            parent: None,
            children: Vec::new(),
            dirty: Dirty::default(),
            disable_scale: false,
            chirality: 1.0,
        });
        id
    }

    /// Create a new node parented to `parent`, with the given local transform.
    pub fn create_child(&mut self, parent: NodeId, local: Transform) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            local,
            global: Transform::IDENTITY,
            parent: Some(parent),
            children: Vec::new(),
            dirty: Dirty {
                global: true,
                vectors: false,
            },
            disable_scale: false,
            chirality: 1.0,
        });
        self.nodes[parent as usize].children.push(id);
        id
    }

    /// Re-parent an existing node. Used when the shadow skeleton's topology
    /// is rebuilt and a node created standalone needs to join the tree.
    pub fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        self.nodes[id as usize].parent = Some(parent);
        self.nodes[parent as usize].children.push(id);
        self.mark_global_dirty(id);
    }

    /// Whether scale should be stripped from this node's composed global
    /// transform (orthonormalized after composition).
    pub fn set_disable_scale(&mut self, id: NodeId, disabled: bool) {
        self.nodes[id as usize].disable_scale = disabled;
    }

    /// Set this node's chirality sign (+1 or -1).
    ///
    /// Per the spec's Open Question resolution, chirality is consumed once
    /// at configuration time (a 180 degree flip baked into the constraint
    /// frame's local transform) rather than propagated through every
    /// rotation during solving; this setter exists for that one-time use,
    /// not as a per-iteration runtime toggle.
    pub fn set_chirality(&mut self, id: NodeId, sign: f32) {
        self.nodes[id as usize].chirality = sign.signum();
    }

    /// This node's chirality sign.
    #[must_use]
    pub fn chirality(&self, id: NodeId) -> f32 {
        self.nodes[id as usize].chirality
    }

    /// Store a new local transform, marking this node and all descendants'
    /// global transforms dirty.
    pub fn set_local(&mut self, id: NodeId, local: Transform) {
        self.nodes[id as usize].local = local;
        self.mark_global_dirty(id);
    }

    /// Store a new global transform, converting it to the equivalent local
    /// transform given the current parent chain.
    pub fn set_global(&mut self, id: NodeId, global: Transform) {
        let local = match self.nodes[id as usize].parent {
            Some(parent) => self.get_global(parent).inverse() * global,
            None => global,
        };
        let node = &mut self.nodes[id as usize];
        node.local = local;
        node.global = global;
        node.dirty.global = false;
        node.dirty.vectors = true;
        self.mark_descendants_global_dirty(id);
    }

    /// This node's local transform.
    #[must_use]
    pub fn get_local(&self, id: NodeId) -> Transform {
        self.nodes[id as usize].local
    }

    /// This node's global transform, lazily recomposed up the parent chain
    /// if stale.
    pub fn get_global(&mut self, id: NodeId) -> Transform {
        if !self.nodes[id as usize].dirty.global {
            return self.nodes[id as usize].global;
        }

        let parent = self.nodes[id as usize].parent;
        let local = self.nodes[id as usize].local;
        let mut global = match parent {
            Some(p) => self.get_global(p) * local,
            None => local,
        };
        if self.nodes[id as usize].disable_scale {
            global = global.orthonormalized();
        }
        let node = &mut self.nodes[id as usize];
        node.global = global;
        node.dirty.global = false;
        global
    }

    /// Convert a point expressed in this node's parent's global space into
    /// this node's local space. (Equivalent to the reference's `to_local`
    /// when called relative to the node itself: it is offered as a
    /// free function on `global` below, this method name is reserved for
    /// symmetry with `to_global`.)
    pub fn to_local(&mut self, id: NodeId, global_point: Vec3) -> Vec3 {
        self.get_global(id).inverse().transform_point(global_point)
    }

    /// Convert a point expressed in this node's local space into global
    /// space.
    pub fn to_global(&mut self, id: NodeId, local_point: Vec3) -> Vec3 {
        self.get_global(id).transform_point(local_point)
    }

    /// Apply a rotation expressed in the parent's global frame to this
    /// node's local rotation, leaving the local translation unchanged.
    ///
    /// `new_local.rotation = (parent_global.rotation^-1 * q * parent_global.rotation) * local.rotation`
    ///
    /// This is the primitive Kusudama rectification uses: "rotate the bone
    /// as if `q` had been applied in world space, without moving its
    /// origin".
    pub fn rotate_local_with_global(&mut self, id: NodeId, q: glam::Quat) {
        let parent_rotation = match self.nodes[id as usize].parent {
            Some(p) => self.get_global(p).rotation,
            None => glam::Quat::IDENTITY,
        };
        let local_rotation_delta = parent_rotation.conjugate() * q * parent_rotation;
        let node = &mut self.nodes[id as usize];
        let new_rotation = (local_rotation_delta * node.local.rotation).normalize();
        node.local.rotation = new_rotation;
        self.mark_global_dirty(id);
    }

    /// Reset this node's local transform to identity.
    pub fn set_identity(&mut self, id: NodeId) {
        self.set_local(id, Transform::IDENTITY);
    }

    /// Replace the local rotation with its nearest orthonormal form.
    pub fn orthonormalize(&mut self, id: NodeId) {
        let local = self.nodes[id as usize].local.orthonormalized();
        self.set_local(id, local);
    }

    fn mark_global_dirty(&mut self, id: NodeId) {
        self.nodes[id as usize].dirty.global = true;
        self.mark_descendants_global_dirty(id);
    }

    fn mark_descendants_global_dirty(&mut self, id: NodeId) {
        let mut stack = self.nodes[id as usize].children.clone();
        while let Some(child) = stack.pop() {
            self.nodes[child as usize].dirty.global = true;
            stack.extend(self.nodes[child as usize].children.iter().copied());
        }
    }
}
