//! End-to-end tests of the `gblur` binary on the CPU reference path.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn gblur(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gblur"))
        .args(args)
        .output()
        .expect("failed to spawn gblur")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// 9x9 black image with one white opaque pixel in the center.
fn write_point_png(dir: &Path) -> PathBuf {
    let mut img = image::RgbaImage::from_pixel(9, 9, image::Rgba([0, 0, 0, 255]));
    img.put_pixel(4, 4, image::Rgba([255, 255, 255, 255]));
    let path = dir.join("point.png");
    img.save(&path).unwrap();
    path
}

#[test]
fn test_formats_lists_registry() {
    let out = gblur(&["formats"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for id in ["r8uint", "rgba8unorm", "bgra8unorm", "rgba32float", "r32sint"] {
        assert!(stdout.contains(id), "missing {id} in:\n{stdout}");
    }
}

#[test]
fn test_cpu_blur_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_point_png(dir.path());
    let output = dir.path().join("out.png");

    for method in ["direct", "separable"] {
        let out = gblur(&[
            "blur",
            &path_arg(&input),
            "-o",
            &path_arg(&output),
            "-r",
            "2",
            "--method",
            method,
            "--cpu",
        ]);
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

        let result = image::open(&output).unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (9, 9));
        let center = result.get_pixel(4, 4);
        let neighbor = result.get_pixel(5, 4);
        assert!(center[0] < 255 && center[0] > neighbor[0]);
        assert!(neighbor[0] > 0);
        assert_eq!(result.get_pixel(0, 0)[0], 0);
        assert!(result.pixels().all(|p| p[3] == 255));
    }
}

#[test]
fn test_cpu_blur_radius_zero_copies() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_point_png(dir.path());
    let output = dir.path().join("copy.png");

    let out = gblur(&["blur", &path_arg(&input), "-o", &path_arg(&output), "-r", "0", "--cpu"]);
    assert!(out.status.success());

    let a = image::open(&input).unwrap().to_rgba8();
    let b = image::open(&output).unwrap().to_rgba8();
    assert_eq!(a.as_raw(), b.as_raw());
}

#[test]
fn test_blur_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = gblur(&[
        "blur",
        &path_arg(&dir.path().join("nope.png")),
        "-o",
        &path_arg(&dir.path().join("out.png")),
        "--cpu",
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Failed to load"));
}

#[test]
fn test_cpu_sweep_coalesces() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_point_png(dir.path());
    let output = dir.path().join("sweep.png");

    let out = gblur(&[
        "sweep",
        &path_arg(&input),
        "-o",
        &path_arg(&output),
        "--radii",
        "1,2,3,4",
        "--cpu",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(output.is_file());

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("requests: 4"), "{stdout}");
}

#[test]
fn test_cpu_bench_prints_table() {
    let out = gblur(&["bench", "--cpu", "--size", "16", "--radii", "1,3", "-n", "1"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("RADIUS"));
    assert!(stdout.contains("16x16 rgba8unorm"));
}

#[test]
fn test_log_file_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("gblur.log");
    let out = gblur(&["-v", "--log-file", &path_arg(&log), "formats"]);
    assert!(out.status.success());
    assert!(log.is_file());
}
