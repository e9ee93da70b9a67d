use veneer_engine::error::PolygonIssue;
use veneer_engine::triangulate::{mesh_polygon, signed_area, triangulate, validate_polygon};
use veneer_engine::utils::Position;

fn pts(coords: &[(f32, f32)]) -> Vec<Position> {
    coords.iter().map(|&(x, y)| Position::new(x, y)).collect()
}

#[test]
fn same_points_give_identical_meshes() {
    let l_shape = pts(&[
        (0.0, 0.0),
        (200.0, 0.0),
        (200.0, 60.0),
        (60.0, 60.0),
        (60.0, 200.0),
        (0.0, 200.0),
    ]);
    let a = triangulate(&l_shape).unwrap();
    let b = triangulate(&l_shape).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.vertex_count(), 6);
    assert_eq!(a.triangle_count(), 4);
    assert!(a.indices.iter().all(|&i| (i as usize) < a.vertex_count()));
}

#[test]
fn concave_mesh_covers_polygon_area() {
    let l_shape = pts(&[
        (0.0, 0.0),
        (200.0, 0.0),
        (200.0, 60.0),
        (60.0, 60.0),
        (60.0, 200.0),
        (0.0, 200.0),
    ]);
    let mesh = triangulate(&l_shape).unwrap();
    let positions: Vec<Position> = mesh.positions().collect();
    let covered: f32 = mesh
        .indices
        .chunks_exact(3)
        .map(|t| {
            let tri = [
                positions[t[0] as usize],
                positions[t[1] as usize],
                positions[t[2] as usize],
            ];
            signed_area(&tri).abs()
        })
        .sum();
    assert!((covered - signed_area(&l_shape).abs()).abs() < 1e-2);
}

#[test]
fn too_few_points_are_rejected() {
    assert!(triangulate(&[]).is_none());
    assert!(triangulate(&pts(&[(0.0, 0.0), (10.0, 10.0)])).is_none());
    assert_eq!(
        mesh_polygon(&pts(&[(0.0, 0.0), (10.0, 10.0)])),
        Err(PolygonIssue::TooFewPoints(2))
    );
}

#[test]
fn tiny_area_is_rejected() {
    // 9x9 = 81 px², below the minimum
    let small = pts(&[(0.0, 0.0), (9.0, 0.0), (9.0, 9.0), (0.0, 9.0)]);
    assert!(matches!(
        validate_polygon(&small),
        Err(PolygonIssue::AreaTooSmall { .. })
    ));
}

#[test]
fn duplicate_consecutive_points_are_rejected() {
    let dup = pts(&[(0.0, 0.0), (100.0, 0.0), (100.2, 0.3), (100.0, 100.0), (0.0, 100.0)]);
    assert_eq!(
        validate_polygon(&dup),
        Err(PolygonIssue::DuplicatePoint { index: 1, next: 2 })
    );

    // closing edge counts too
    let closed = pts(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.1, 0.1)]);
    assert_eq!(
        validate_polygon(&closed),
        Err(PolygonIssue::DuplicatePoint { index: 3, next: 0 })
    );
}

#[test]
fn winding_does_not_matter() {
    let cw = pts(&[(0.0, 0.0), (0.0, 100.0), (100.0, 100.0), (100.0, 0.0)]);
    let ccw: Vec<Position> = cw.iter().rev().copied().collect();
    assert!(mesh_polygon(&cw).is_ok());
    assert!(mesh_polygon(&ccw).is_ok());
}

#[test]
fn non_finite_points_do_not_panic() {
    let bad = pts(&[(0.0, 0.0), (f32::NAN, 0.0), (100.0, 100.0), (0.0, 100.0)]);
    assert!(triangulate(&bad).is_none());
    assert!(mesh_polygon(&bad).is_err());
}

#[test]
fn collinear_points_yield_no_mesh() {
    let line = pts(&[(0.0, 0.0), (50.0, 0.0), (100.0, 0.0)]);
    assert!(mesh_polygon(&line).is_err());
}
