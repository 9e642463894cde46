use cyberscape::octree::{Aabb, Octree, OctreeItem};
use cyberscape::spatial_grid::SpatialGrid;
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn octree_full_query_returns_every_point_once() {
    let bounds = Aabb::new(Vec3::splat(-500.0), Vec3::splat(500.0));
    let mut tree = Octree::new(bounds, 4, 6);
    let mut rng = StdRng::seed_from_u64(42);

    let n = 1000;
    for i in 0..n {
        let position = Vec3::new(
            rng.gen_range(-500.0..500.0),
            rng.gen_range(-500.0..500.0),
            rng.gen_range(-500.0..500.0),
        );
        assert!(tree.insert(OctreeItem { position, radius: 1.0, data: i }));
    }
    assert_eq!(tree.len(), n);

    let mut found = Vec::new();
    tree.query(&bounds, &mut found);
    let mut ids: Vec<usize> = found.iter().map(|item| item.data).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(found.len(), n);
    assert_eq!(ids.len(), n);
}

#[test]
fn octree_disjoint_query_is_empty() {
    let bounds = Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0));
    let mut tree = Octree::new(bounds, 2, 4);
    let mut rng = StdRng::seed_from_u64(7);
    for i in 0..200 {
        let position = Vec3::new(
            rng.gen_range(-100.0..0.0),
            rng.gen_range(-100.0..100.0),
            rng.gen_range(-100.0..100.0),
        );
        tree.insert(OctreeItem { position, radius: 0.5, data: i });
    }

    let mut found = Vec::new();
    tree.query(&Aabb::new(Vec3::new(10.0, -100.0, -100.0), Vec3::splat(100.0)), &mut found);
    assert!(found.is_empty());
}

#[test]
fn octree_depth_limit_keeps_coincident_points() {
    let bounds = Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0));
    let mut tree = Octree::new(bounds, 1, 3);
    for i in 0..50 {
        tree.insert(OctreeItem { position: Vec3::splat(1.0), radius: 0.0, data: i });
    }
    let mut found = Vec::new();
    tree.query(&bounds, &mut found);
    assert_eq!(found.len(), 50);
}

#[test]
fn grid_neighbors_cover_adjacent_cells_only() {
    let mut grid = SpatialGrid::new(100.0);
    grid.insert(0, Vec3::new(50.0, 50.0, 50.0));
    grid.insert(1, Vec3::new(150.0, 150.0, 150.0));
    grid.insert(2, Vec3::new(450.0, 50.0, 50.0));

    let mut out = Vec::new();
    grid.neighbors(Vec3::new(50.0, 50.0, 50.0), &mut out);
    out.sort_unstable();
    assert_eq!(out, vec![0, 1]);
}
