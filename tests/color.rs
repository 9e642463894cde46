use cyberscape::color::{self, Color};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn hex_round_trip_is_exact() {
    assert_eq!(color::hex_to_rgb("#ff00ff"), Some(Color::new(255, 0, 255)));
    assert_eq!(color::hex_to_rgb("#00ff00"), Some(Color::new(0, 255, 0)));
    assert_eq!(color::rgb_to_hex(Color::new(18, 52, 86)), "#123456");
}

#[test]
fn malformed_hex_has_no_value() {
    assert_eq!(color::hex_to_rgb("invalid"), None);
    assert_eq!(color::hex_to_rgb("#ff00f"), None);
    assert_eq!(color::hex_to_rgb("#gg0000"), None);
}

#[test]
fn blend_rounds_half_up() {
    assert_eq!(color::blend_colors("#000000", "#ffffff", 0.5), "#808080");
    assert_eq!(color::blend_colors("#000000", "#ffffff", 0.0), "#000000");
}

#[test]
fn average_and_opacity_helpers() {
    let avg = color::average_colors(&[Color::new(0, 0, 0), Color::new(10, 20, 30)]);
    assert_eq!(avg, Some(Color::new(5, 10, 15)));
    assert_eq!(color::average_colors(&[]), None);
    assert_eq!(color::adjust_color_opacity("#ff0000", 0.5), "rgba(255, 0, 0, 0.5)");
}

#[test]
fn generated_hues_stay_in_cyberpunk_ranges() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..500 {
        let hue = color::random_cyberpunk_hue(&mut rng);
        assert!(color::is_valid_cyberpunk_hue(hue), "{hue}");
    }
    assert!(color::is_valid_cyberpunk_hue(200.0));
    assert!(color::is_valid_cyberpunk_hue(300.0));
    assert!(!color::is_valid_cyberpunk_hue(0.0));
    assert!(!color::is_valid_cyberpunk_hue(360.0));
}
