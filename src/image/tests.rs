use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
    let data = data
        .into_iter()
        .flat_map(|row| row.into_iter())
        .flat_map(|col| col.0)
        .collect::<Vec<_>>();
    Image::from_rgba8(Resolution::new(W as u32, H as u32), &data)
}

#[test]
fn get_set() {
    let mut image = mkimage([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);
    assert_eq!(image.get(0, 0), C::RED);
    assert_eq!(image.get(1, 0), C::GREEN);
    assert_eq!(image.get(0, 1), C::BLUE);
    assert_eq!(image.get(1, 1), C::WHITE);

    image.set(1, 1, C::YELLOW);
    assert_eq!(image.get(1, 1), C::YELLOW);

    // Out-of-bounds writes through the clipped setter are dropped.
    image.set_clipped(-1, 0, C::MAGENTA);
    image.set_clipped(2, 0, C::MAGENTA);
    assert_eq!(image, mkimage([[C::RED, C::GREEN], [C::BLUE, C::YELLOW]]));
}

#[test]
fn clear() {
    let mut image = Image::new(3, 2);
    assert!(image.data().iter().all(|&b| b == 0));

    image.clear(C::WHITE);
    assert!(image.data().iter().all(|&b| b == 0xFF));

    image.clear(C::NONE);
    assert!(image.data().iter().all(|&b| b == 0));
}

#[test]
fn filled() {
    let image = Image::filled((2, 2), C::CYAN);
    assert_eq!(image.resolution(), Resolution::new(2, 2));
    assert_eq!(image.data(), &[0, 255, 255, 255].repeat(4)[..]);
}

#[test]
fn draw_scaled_same_size() {
    let src = mkimage([[C::RED, C::GREEN]]);
    let mut dest = Image::new(2, 1);
    dest.draw_scaled(&src);
    assert_eq!(dest, src);
}

#[test]
fn draw_scaled_stretches() {
    let src = Image::filled((1, 1), C::BLUE);
    let mut dest = Image::filled((4, 3), C::WHITE);
    dest.draw_scaled(&src);
    assert_eq!(dest.resolution(), Resolution::new(4, 3));
    for y in 0..3 {
        for x in 0..4 {
            assert_eq!(dest.get(x, y), C::BLUE);
        }
    }
}

#[test]
fn save_and_load_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");

    let image = mkimage([[C::RED, C::GREEN], [C::BLUE, C::WHITE.with_alpha(7)]]);
    image.save(&path).unwrap();
    assert_eq!(Image::load(&path).unwrap(), image);
}

#[test]
fn unsupported_extension() {
    assert!(Image::load("frame.bmp").is_err());
    assert!(Image::new(1, 1).save("frame").is_err());
}
