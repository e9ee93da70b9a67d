mod common;

use common::{cache_with, MockFetcher, RecordingBackend};
use veneer_engine::config::{FitPolicy, RenderConfig};
use veneer_engine::overlay::VectorOverlay;
use veneer_engine::renderer::MeshRenderer;
use veneer_engine::transform::{
    compute_transform, verify_sync, PhotoSpace, TransformBridge, TransformTarget, ViewTransform,
    MAX_ZOOM,
};
use veneer_engine::utils::{Position, Size};

fn space() -> PhotoSpace {
    PhotoSpace::new(Size::new(2000.0, 1000.0), Size::new(800.0, 600.0))
}

fn layers() -> (VectorOverlay, MeshRenderer<RecordingBackend>) {
    let fetcher = MockFetcher::new();
    let overlay = VectorOverlay::new(RenderConfig::default());
    let renderer = MeshRenderer::new(
        RecordingBackend::default(),
        cache_with(&fetcher),
        RenderConfig::default(),
    );
    (overlay, renderer)
}

fn close(a: Position, b: Position) -> bool {
    (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
}

#[test]
fn contain_fits_and_centres() {
    let t = compute_transform(&space(), FitPolicy::Contain);
    assert_eq!(t.s, 0.4);
    assert_eq!(t.origin_x, 0.0);
    assert_eq!(t.origin_y, 100.0);
}

#[test]
fn cover_fills_the_container() {
    let t = compute_transform(&space(), FitPolicy::Cover);
    assert_eq!(t.s, 0.6);
    assert_eq!(t.origin_x, -200.0);
    assert_eq!(t.origin_y, 0.0);
}

#[test]
fn zoom_and_pan_compose() {
    let mut s = space();
    s.zoom = 2.0;
    s.pan_x = 15.0;
    s.pan_y = -5.0;
    let t = compute_transform(&s, FitPolicy::Contain);
    assert_eq!(t.s, 0.8);
    // 2000 * 0.8 = 1600 wide in an 800 container
    assert_eq!(t.origin_x, -400.0 + 15.0);
    assert_eq!(t.origin_y, -100.0 - 5.0);
}

#[test]
fn missing_image_gives_identity_scale() {
    let s = PhotoSpace::new(Size::new(0.0, 0.0), Size::new(800.0, 600.0));
    assert_eq!(compute_transform(&s, FitPolicy::Contain), ViewTransform::IDENTITY);
}

#[test]
fn screen_and_image_mapping_round_trip() {
    let t = compute_transform(&space(), FitPolicy::Contain);
    let p = Position::new(1234.5, 321.0);
    assert!(close(t.screen_to_image(t.image_to_screen(p)), p));
}

#[test]
fn both_layers_receive_identical_transforms() {
    let (mut overlay, mut renderer) = layers();
    let mut bridge = TransformBridge::new(space(), FitPolicy::Contain);
    bridge.zoom_at(1.7, Position::new(333.0, 222.0));
    bridge.pan_by(12.25, -7.5);

    let update = bridge.sync(&mut overlay, &mut renderer).unwrap();
    let vector = overlay.applied_transform().unwrap();
    let stage = renderer.applied_transform().unwrap();
    assert_eq!(vector.s.to_bits(), stage.s.to_bits());
    assert_eq!(vector.origin_x.to_bits(), stage.origin_x.to_bits());
    assert_eq!(vector.origin_y.to_bits(), stage.origin_y.to_bits());
    assert_eq!(vector, update.transform);
    assert_eq!(renderer.backend().stage, Some(update.transform));
    assert!(verify_sync(&overlay, &renderer).is_ok());
}

#[test]
fn desync_is_detected() {
    let (mut overlay, mut renderer) = layers();
    overlay.apply_transform(ViewTransform::IDENTITY);
    renderer.apply_transform(ViewTransform {
        s: 1.0,
        origin_x: 0.5,
        origin_y: 0.0,
    });
    let err = verify_sync(&overlay, &renderer).unwrap_err();
    assert_eq!(err.vector, Some(ViewTransform::IDENTITY));

    let fresh = VectorOverlay::new(RenderConfig::default());
    assert!(verify_sync(&fresh, &renderer).is_err());
}

#[test]
fn zoom_at_keeps_anchor_fixed() {
    let mut bridge = TransformBridge::new(space(), FitPolicy::Contain);
    let anchor = Position::new(500.0, 250.0);
    let before = bridge.transform().screen_to_image(anchor);

    bridge.zoom_at(3.0, anchor);
    let after = bridge.transform();
    assert!(close(after.screen_to_image(anchor), before));
    assert!((bridge.space().zoom - 3.0).abs() < 1e-6);

    bridge.zoom_at(1000.0, anchor);
    assert_eq!(bridge.space().zoom, MAX_ZOOM);

    bridge.reset_view();
    assert_eq!(bridge.transform(), compute_transform(&space(), FitPolicy::Contain));
}

#[test]
fn resize_bursts_apply_once() {
    let (mut overlay, mut renderer) = layers();
    let mut bridge = TransformBridge::new(space(), FitPolicy::Contain);
    bridge.sync(&mut overlay, &mut renderer);

    for w in [810, 820, 830, 1000] {
        bridge.request_resize(w, 500);
    }
    let update = bridge.sync(&mut overlay, &mut renderer).unwrap();
    assert_eq!(update.resized, Some((1000, 500)));
    assert_eq!(bridge.space().container_w, 1000.0);
    // 2000x1000 image in 1000x500: scale 0.5, no letterbox
    assert_eq!(update.transform.s, 0.5);
    assert_eq!(
        renderer
            .backend()
            .count(|c| matches!(c, common::Call::Resize(..))),
        1
    );

    assert!(bridge.sync(&mut overlay, &mut renderer).is_none());
}

#[test]
fn image_size_arrives_late() {
    let mut bridge = TransformBridge::new(
        PhotoSpace::new(Size::new(0.0, 0.0), Size::new(800.0, 600.0)),
        FitPolicy::Contain,
    );
    assert_eq!(bridge.flush().unwrap().transform, ViewTransform::IDENTITY);
    assert!(bridge.flush().is_none());

    bridge.set_image_size(1600.0, 1200.0);
    assert_eq!(bridge.flush().unwrap().transform.s, 0.5);
}

#[test]
fn clip_matrix_maps_viewport_corners() {
    let t = ViewTransform {
        s: 2.0,
        origin_x: 100.0,
        origin_y: 50.0,
    };
    let viewport = Size::new(400.0, 200.0);
    let m = t.to_clip_matrix(viewport);
    let clip = |x: f32, y: f32| {
        (
            m[0][0] * x + m[1][0] * y + m[3][0],
            m[0][1] * x + m[1][1] * y + m[3][1],
        )
    };
    // image (0,0) lands at screen (100,50)
    let (cx, cy) = clip(0.0, 0.0);
    assert!((cx - (-0.5)).abs() < 1e-6 && (cy - 0.5).abs() < 1e-6);
    // image (150, 75) lands at screen (400, 200): bottom-right corner
    let (cx, cy) = clip(150.0, 75.0);
    assert!((cx - 1.0).abs() < 1e-6 && (cy + 1.0).abs() < 1e-6);
}
