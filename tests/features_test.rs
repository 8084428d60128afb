use image::{GrayImage, Rgb, RgbImage};
use pano_stitch::features::fast;
use pano_stitch::features::plane::Plane;
use pano_stitch::features::{
    extract_features, Descriptors, DetectDescribe, FeatureConfig, FeatureMethod, Orb,
};

mod common;

fn check_feature_set(method: FeatureMethod, expected_len: usize) {
    let img = common::textured_scene(320, 240, 7);
    let config = FeatureConfig { max_features: 300 };
    let features = extract_features(&img, method, &config);
    assert!(!features.is_empty(), "{} found no keypoints", method);
    assert!(features.len() <= 300);
    assert_eq!(features.method, method);
    assert_eq!(features.descriptors.len(), features.len());
    assert_eq!(features.descriptors.row_len(), expected_len);
    for kp in &features.keypoints {
        assert!(kp.x >= 0.0 && kp.x < 320.0);
        assert!(kp.y >= 0.0 && kp.y < 240.0);
        assert!(kp.orientation >= 0.0 && kp.orientation < std::f32::consts::TAU);
    }
}

#[test]
fn test_method_parsing() {
    assert_eq!("sift".parse::<FeatureMethod>().unwrap(), FeatureMethod::Sift);
    assert_eq!("BRISK".parse::<FeatureMethod>().unwrap(), FeatureMethod::Brisk);
    assert_eq!("Orb".parse::<FeatureMethod>().unwrap(), FeatureMethod::Orb);
    let err = "orb2".parse::<FeatureMethod>().unwrap_err();
    assert!(matches!(err, pano_stitch::StitchError::UnsupportedMethod(name) if name == "orb2"));
}

#[test]
fn test_fast_finds_square_corners() {
    let plane = Plane::from_fn(60, 60, |x, y| {
        if (20..40).contains(&x) && (20..40).contains(&y) {
            200.0
        } else {
            50.0
        }
    });
    let corners = fast::detect(&plane, 20.0, 3);
    assert!(corners.len() >= 4);
    for (cx, cy) in [(20, 20), (39, 20), (20, 39), (39, 39)] {
        let near = corners
            .iter()
            .any(|c| (c.x as i32 - cx).abs() <= 3 && (c.y as i32 - cy).abs() <= 3);
        assert!(near, "no corner near ({}, {})", cx, cy);
    }
    // nothing along the middle of an edge
    assert!(corners.iter().all(|c| !(c.x == 30 && c.y == 20)));
}

#[test]
fn test_orb_features() {
    check_feature_set(FeatureMethod::Orb, 32);
}

#[test]
fn test_brisk_features() {
    check_feature_set(FeatureMethod::Brisk, 32);
}

#[test]
fn test_sift_features() {
    check_feature_set(FeatureMethod::Sift, 128);
    let img = common::textured_scene(320, 240, 7);
    let features = extract_features(&img, FeatureMethod::Sift, &FeatureConfig::default());
    let Descriptors::Float { dim, data } = &features.descriptors else {
        panic!("sift descriptors must be float");
    };
    for row in data.chunks(*dim) {
        let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "descriptor norm {}", norm);
        assert!(row.iter().all(|v| *v >= 0.0));
    }
}

#[test]
fn test_tiny_and_flat_images_give_empty_sets() {
    let tiny = RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]));
    let flat = RgbImage::from_pixel(200, 150, Rgb([90, 90, 90]));
    for method in [FeatureMethod::Sift, FeatureMethod::Brisk, FeatureMethod::Orb] {
        for img in [&tiny, &flat] {
            let features = extract_features(img, method, &FeatureConfig::default());
            assert!(features.is_empty());
            assert!(features.descriptors.is_empty());
        }
    }
}

#[test]
fn test_orb_is_deterministic() {
    let gray: GrayImage = image::imageops::grayscale(&common::textured_scene(200, 160, 11));
    let orb = Orb::default();
    let a = orb.detect_and_describe(&gray);
    let b = orb.detect_and_describe(&gray);
    assert_eq!(a.keypoints, b.keypoints);
    assert_eq!(a.descriptors, b.descriptors);
}
