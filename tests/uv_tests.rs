use veneer_engine::config::{UvAddressing, UvMappingPolicy};
use veneer_engine::model::{BondPattern, Calibration};
use veneer_engine::utils::Position;
use veneer_engine::uv::{
    apply_bond_pattern, apply_offset, compute_uvs, rotate_uvs, stretch_uvs, Uv, UvMapping,
    UvParams,
};

fn square(size: f32) -> Vec<Position> {
    vec![
        Position::new(0.0, 0.0),
        Position::new(size, 0.0),
        Position::new(size, size),
        Position::new(0.0, size),
    ]
}

fn assert_uvs(actual: &[Uv], expected: &[Uv]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a[0] - e[0]).abs() < 1e-5 && (a[1] - e[1]).abs() < 1e-5,
            "{a:?} != {e:?}"
        );
    }
}

const UNIT_CORNERS: [Uv; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

#[test]
fn calibrated_square_maps_to_one_tile() {
    let mapping = UvMapping::World {
        px_per_unit: 100.0,
        repeat: 1.0,
    };
    for addressing in [UvAddressing::Clamp, UvAddressing::Repeat] {
        let uvs = compute_uvs(&square(100.0), &UvParams::new(mapping, addressing));
        assert_uvs(&uvs, &UNIT_CORNERS);
    }
}

#[test]
fn stretch_normalises_by_bounds() {
    let offset_square: Vec<Position> = square(50.0)
        .into_iter()
        .map(|p| Position::new(p.x + 300.0, p.y + 20.0))
        .collect();
    assert_uvs(&stretch_uvs(&offset_square), &UNIT_CORNERS);
}

#[test]
fn offset_wrap_stays_in_unit_interval() {
    let mut uvs: Vec<Uv> = vec![
        [0.0, 0.0],
        [-3.7, 12.2],
        [0.999_999, -0.000_001],
        [5.0, -5.0],
        [-1e-9, 1e-9],
    ];
    for &(ox, oy) in &[(0.0, 0.0), (0.25, -0.75), (-3.5, 7.125), (1.0, -1.0)] {
        let mut shifted = uvs.clone();
        apply_offset(&mut shifted, ox, oy);
        for [u, v] in shifted {
            assert!((0.0..1.0).contains(&u), "u = {u}");
            assert!((0.0..1.0).contains(&v), "v = {v}");
        }
    }
    apply_offset(&mut uvs, 0.5, 0.5);
    assert!((uvs[0][0] - 0.5).abs() < 1e-6);
}

#[test]
fn straight_bond_is_identity() {
    let uvs: Vec<Uv> = vec![[0.1, 0.2], [1.7, -2.3], [3.0, 4.5]];
    assert_eq!(apply_bond_pattern(&uvs, BondPattern::Straight), uvs);
}

#[test]
fn brick_shifts_odd_rows_by_half() {
    let uvs: Vec<Uv> = vec![[0.2, 0.5], [0.2, 1.5], [0.2, -0.5]];
    let bonded = apply_bond_pattern(&uvs, BondPattern::Brick50);
    assert_uvs(&bonded, &[[0.2, 0.5], [0.7, 1.5], [0.7, -0.5]]);
}

#[test]
fn herringbone_transposes_alternate_cells() {
    let uvs: Vec<Uv> = vec![[0.2, 0.7], [1.2, 0.7], [1.2, 1.7]];
    let bonded = apply_bond_pattern(&uvs, BondPattern::Herringbone);
    // cell (1, 0) is odd: local (0.2, 0.7) becomes (0.7, 0.2)
    assert_uvs(&bonded, &[[0.2, 0.7], [1.7, 0.2], [1.2, 1.7]]);
}

#[test]
fn rotation_is_about_texture_centre() {
    let mut uvs: Vec<Uv> = vec![[0.5, 0.5], [1.0, 0.5]];
    rotate_uvs(&mut uvs, 90.0);
    assert_uvs(&uvs, &[[0.5, 0.5], [0.5, 1.0]]);
}

#[test]
fn clamp_addressing_keeps_offsets_in_range() {
    let mapping = UvMapping::World {
        px_per_unit: 100.0,
        repeat: 0.5,
    };
    let mut params = UvParams::new(mapping, UvAddressing::Clamp);
    params.offset_x = 0.3;
    params.offset_y = -0.2;
    for [u, v] in compute_uvs(&square(100.0), &params) {
        assert!((0.0..=1.0).contains(&u));
        assert!((0.0..=1.0).contains(&v));
    }
}

#[test]
fn repeat_addressing_keeps_tile_coordinates_continuous() {
    let mapping = UvMapping::World {
        px_per_unit: 100.0,
        repeat: 0.5,
    };
    let uvs = compute_uvs(&square(100.0), &UvParams::new(mapping, UvAddressing::Repeat));
    assert_uvs(&uvs, &[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]);
}

#[test]
fn auto_policy_needs_usable_calibration() {
    let good = Some(Calibration { px_per_meter: 120.0 });
    let zero = Some(Calibration { px_per_meter: 0.0 });
    assert_eq!(
        UvMapping::select(UvMappingPolicy::Auto, good, 0.3),
        UvMapping::World {
            px_per_unit: 120.0,
            repeat: 0.3
        }
    );
    assert_eq!(
        UvMapping::select(UvMappingPolicy::Auto, zero, 0.3),
        UvMapping::Stretch
    );
    assert_eq!(
        UvMapping::select(UvMappingPolicy::World, None, 0.3),
        UvMapping::Stretch
    );
    assert_eq!(
        UvMapping::select(UvMappingPolicy::Stretch, good, 0.3),
        UvMapping::Stretch
    );
}
