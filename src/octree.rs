//! Octree over points with a radius
//!
//! Rebuilt from scratch every frame. Nodes live in a flat arena; children of a
//! split node are eight consecutive entries.

use glam::Vec3;

/// Axis-aligned box, inclusive on every face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Octant index: bit 0 for +X, bit 1 for +Y, bit 2 for +Z.
    fn octant(&self, p: Vec3) -> usize {
        let c = self.center();
        (p.x > c.x) as usize | ((p.y > c.y) as usize) << 1 | ((p.z > c.z) as usize) << 2
    }

    fn child(&self, octant: usize) -> Aabb {
        let c = self.center();
        let pick = |bit: usize, lo: f32, mid: f32, hi: f32| {
            if octant & bit != 0 {
                (mid, hi)
            } else {
                (lo, mid)
            }
        };
        let (x0, x1) = pick(1, self.min.x, c.x, self.max.x);
        let (y0, y1) = pick(2, self.min.y, c.y, self.max.y);
        let (z0, z1) = pick(4, self.min.z, c.z, self.max.z);
        Aabb::new(Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OctreeItem<T> {
    pub position: Vec3,
    pub radius: f32,
    pub data: T,
}

struct Node<T> {
    bounds: Aabb,
    depth: usize,
    items: Vec<OctreeItem<T>>,
    /// Arena index of the first of eight children
    children: Option<usize>,
}

pub struct Octree<T> {
    nodes: Vec<Node<T>>,
    max_objects: usize,
    max_depth: usize,
    len: usize,
    /// Traversal scratch for `query`
    stack: Vec<usize>,
}

impl<T: Copy> Octree<T> {
    pub fn new(bounds: Aabb, max_objects: usize, max_depth: usize) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            max_objects: max_objects.max(1),
            max_depth,
            len: 0,
            stack: Vec::new(),
        };
        tree.reset(bounds);
        tree
    }

    /// Drop every object and retarget the root bounds. Keeps allocations.
    pub fn reset(&mut self, bounds: Aabb) {
        self.nodes.clear();
        self.nodes.push(Node {
            bounds,
            depth: 0,
            items: Vec::new(),
            children: None,
        });
        self.len = 0;
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes[0].bounds
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an object. Returns false when it lies outside the root bounds.
    pub fn insert(&mut self, item: OctreeItem<T>) -> bool {
        if !self.nodes[0].bounds.contains(item.position) {
            return false;
        }

        let mut index = 0;
        loop {
            if let Some(first) = self.nodes[index].children {
                index = first + self.nodes[index].bounds.octant(item.position);
                continue;
            }
            let node = &self.nodes[index];
            if node.items.len() >= self.max_objects && node.depth < self.max_depth {
                self.split(index);
                continue;
            }
            self.nodes[index].items.push(item);
            self.len += 1;
            return true;
        }
    }

    fn split(&mut self, index: usize) {
        let first = self.nodes.len();
        let bounds = self.nodes[index].bounds;
        let depth = self.nodes[index].depth + 1;
        for octant in 0..8 {
            self.nodes.push(Node {
                bounds: bounds.child(octant),
                depth,
                items: Vec::new(),
                children: None,
            });
        }
        self.nodes[index].children = Some(first);

        let items = std::mem::take(&mut self.nodes[index].items);
        for item in items {
            let child = first + bounds.octant(item.position);
            self.nodes[child].items.push(item);
        }
    }

    /// Append every object inside `range` to `out`.
    pub fn query(&mut self, range: &Aabb, out: &mut Vec<OctreeItem<T>>) {
        self.stack.clear();
        self.stack.push(0);
        while let Some(index) = self.stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.intersects(range) {
                continue;
            }
            match node.children {
                Some(first) => self.stack.extend(first..first + 8),
                None => out.extend(node.items.iter().filter(|i| range.contains(i.position)).copied()),
            }
        }
    }
}
