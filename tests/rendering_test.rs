use image::{Rgb, RgbImage};
use nalgebra as na;
use pano_stitch::rendering::{brute_force_blend, canvas_for, simple_blend, BlendStrategy};
use pano_stitch::types::Homography;
use pano_stitch::StitchError;

mod common;

const MAX_PIXELS: u64 = 64_000_000;

#[test]
fn test_identity_blends_reproduce_image() {
    let img = common::textured_scene(120, 90, 2);
    let h = Homography::identity();
    for strategy in BlendStrategy::ALL {
        let composite = strategy.render(&img, &img, &h, MAX_PIXELS).unwrap();
        assert_eq!(composite.offset, (0, 0));
        assert_eq!(composite.image, img, "{:?} changed the image", strategy);
    }
}

#[test]
fn test_translated_views_canvas_and_overlap() {
    let reference = RgbImage::from_pixel(400, 300, Rgb([100, 100, 100]));
    let warped = RgbImage::from_pixel(400, 300, Rgb([200, 200, 200]));
    let h = Homography::translation(350.0, 0.0);

    let simple = simple_blend(&reference, &warped, &h, MAX_PIXELS).unwrap();
    assert_eq!(simple.image.dimensions(), (750, 300));
    assert_eq!(simple.offset, (0, 0));
    for y in [0, 150, 299] {
        assert_eq!(simple.image.get_pixel(100, y).0, [100; 3]);
        assert_eq!(simple.image.get_pixel(600, y).0, [200; 3]);
        for x in 350..400 {
            let v = simple.image.get_pixel(x, y).0[0];
            assert!(v > 100 && v < 200, "overlap pixel ({}, {}) = {}", x, y, v);
        }
    }
    // closer to the reference interior the reference dominates
    assert!(simple.image.get_pixel(352, 150).0[0] < simple.image.get_pixel(397, 150).0[0]);

    let brute = brute_force_blend(&reference, &warped, &h, MAX_PIXELS).unwrap();
    assert_eq!(brute.image.dimensions(), (750, 300));
    assert_eq!(brute.image.get_pixel(349, 10).0, [100; 3]);
    assert_eq!(brute.image.get_pixel(350, 10).0, [200; 3]);
    assert_eq!(brute.image.get_pixel(749, 299).0, [200; 3]);
}

#[test]
fn test_simple_blend_is_symmetric() {
    let a = common::textured_scene(400, 300, 21);
    let b = common::textured_scene(400, 300, 22);
    let h = Homography::translation(120.0, 15.0);

    let ab = simple_blend(&a, &b, &h, MAX_PIXELS).unwrap();
    let ba = simple_blend(&b, &a, &h.inverse(), MAX_PIXELS).unwrap();
    assert_eq!(ab.image.dimensions(), (520, 315));
    assert_eq!(ba.image.dimensions(), (520, 315));
    assert_eq!(ab.offset, (0, 0));
    assert_eq!(ba.offset, (120, 15));
    // with these offsets both canvases share the same pixel grid
    assert_eq!(ab.image, ba.image);
}

#[test]
fn test_uncovered_pixels_are_black() {
    let img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
    let h = Homography::translation(150.0, 150.0);
    for strategy in BlendStrategy::ALL {
        let composite = strategy.render(&img, &img, &h, MAX_PIXELS).unwrap();
        assert_eq!(composite.image.dimensions(), (250, 250));
        assert_eq!(composite.image.get_pixel(200, 20).0, [0; 3]);
        assert_eq!(composite.image.get_pixel(20, 200).0, [0; 3]);
        assert_eq!(composite.image.get_pixel(50, 50).0, [255; 3]);
        assert_eq!(composite.image.get_pixel(200, 200).0, [255; 3]);
    }
}

#[test]
fn test_negative_offset_canvas() {
    let h = Homography::translation(-250.0, 0.0);
    let canvas = canvas_for((400, 300), (400, 300), &h, MAX_PIXELS).unwrap();
    assert_eq!((canvas.width, canvas.height), (650, 300));
    assert_eq!(canvas.offset, (250, 0));
}

#[test]
fn test_corner_at_infinity_is_degenerate() {
    let h = Homography::new(na::Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, -0.01, 0.0, 1.0))
        .unwrap();
    let err = canvas_for((400, 300), (400, 300), &h, MAX_PIXELS).unwrap_err();
    assert!(matches!(err, StitchError::DegenerateGeometry(_)));
}

#[test]
fn test_canvas_limit() {
    let img = RgbImage::new(40, 30);
    let h = Homography::translation(1000.0, 0.0);
    let err = simple_blend(&img, &img, &h, 10_000).unwrap_err();
    assert!(matches!(
        err,
        StitchError::CanvasTooLarge {
            width: 1040,
            height: 30
        }
    ));
}
