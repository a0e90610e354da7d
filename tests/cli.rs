//! CLI integration tests for the pxtrack binary
//!
//! These tests run the binary on PNG fixtures written to a temporary
//! directory and check exit codes, printed output and written images.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::RgbaImage;
use pxtrack::link::TemplateLink;
use pxtrack::palette::Palette;
use tempfile::TempDir;

/// Run the binary inside `dir`, isolated from any user configuration
fn pxtrack(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pxtrack"))
        .args(args)
        .current_dir(dir)
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("HOME")
        .output()
        .expect("Failed to execute pxtrack")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_success(output: &Output) {
    assert!(output.status.success(), "pxtrack failed: {}", String::from_utf8_lossy(&output.stderr));
}

/// A 4x4 image in palette colors: column x has color x + 2
fn write_art(dir: &Path) -> PathBuf {
    let palette = Palette::pxls_classic();
    let art = RgbaImage::from_fn(4, 4, |x, _| palette.get(x as u8 + 2).expect("color exists"));
    let path = dir.join("art.png");
    art.save(&path).expect("Failed to write fixture");
    path
}

fn write_board(dir: &Path, index: u8) -> PathBuf {
    let color = Palette::pxls_classic().get(index).expect("color exists");
    let path = dir.join("board.png");
    RgbaImage::from_pixel(10, 10, color).save(&path).expect("Failed to write fixture");
    path
}

fn dimensions(path: &Path) -> (u32, u32) {
    image::open(path).expect("Failed to open output image").to_rgba8().dimensions()
}

#[test]
fn test_reduce_writes_same_size_image() {
    let temp = TempDir::new().unwrap();
    write_art(temp.path());

    let output = pxtrack(temp.path(), &["reduce", "art.png", "-o", "reduced.png"]);
    assert_success(&output);
    assert!(stdout(&output).contains("16 colored cells"));
    assert_eq!(dimensions(&temp.path().join("reduced.png")), (4, 4));
}

#[test]
fn test_templatize_then_detemplatize_round_trip() {
    let temp = TempDir::new().unwrap();
    write_art(temp.path());

    let output = pxtrack(
        temp.path(),
        &["templatize", "art.png", "--style", "plus", "--image-url", "https://img.example/flag.png", "--ox", "3"],
    );
    assert_success(&output);
    let template = temp.path().join("art_template.png");
    assert_eq!(dimensions(&template), (12, 12));
    assert!(stdout(&output).contains("template=https%3A%2F%2Fimg.example%2Fflag.png&ox=3&oy=0&tw=4"));

    let output = pxtrack(temp.path(), &["detemplatize", "art_template.png", "--tw", "4", "-o", "decoded.png"]);
    assert_success(&output);
    let original = image::open(temp.path().join("art.png")).unwrap().to_rgba8();
    let decoded = image::open(temp.path().join("decoded.png")).unwrap().to_rgba8();
    assert_eq!(decoded, original);
}

#[test]
fn test_templatize_link_parses_without_config() {
    let temp = TempDir::new().unwrap();
    write_art(temp.path());

    let output = pxtrack(temp.path(), &["templatize", "art.png", "--image-url", "https://img.example/a.png", "--oy", "-4"]);
    assert_success(&output);
    let text = stdout(&output);
    let link = text
        .lines()
        .find_map(|line| line.strip_prefix("Link: "))
        .expect("templatize should print a link")
        .to_string();
    assert!(link.starts_with("https://pxls.space/#"), "unexpected link {}", link);

    let parsed = TemplateLink::parse(&link).expect("link should parse");
    assert_eq!((parsed.true_width, parsed.ox, parsed.oy), (4, 0, -4));
    assert_success(&pxtrack(temp.path(), &["link", "parse", link.as_str()]));
}

#[test]
fn test_templatize_unknown_style() {
    let temp = TempDir::new().unwrap();
    write_art(temp.path());
    let output = pxtrack(temp.path(), &["templatize", "art.png", "--style", "sparkly"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_detemplatize_invalid_true_width() {
    let temp = TempDir::new().unwrap();
    write_art(temp.path());
    let output = pxtrack(temp.path(), &["detemplatize", "art.png", "--tw", "0"]);
    assert_eq!(output.status.code(), Some(2));
    let output = pxtrack(temp.path(), &["detemplatize", "art.png", "--tw", "9"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_link_make_and_parse() {
    let temp = TempDir::new().unwrap();
    let output = pxtrack(
        temp.path(),
        &["link", "make", "https://x/a.png", "--tw", "4", "--ox", "1", "--oy", "2", "--title", "My flag"],
    );
    assert_success(&output);
    let url = stdout(&output).trim().to_string();
    assert_eq!(
        url,
        "https://pxls.space/#x=1&y=2&scale=5&template=https%3A%2F%2Fx%2Fa.png&ox=1&oy=2&tw=4&title=My%20flag"
    );

    let output = pxtrack(temp.path(), &["link", "parse", url.as_str()]);
    assert_success(&output);
    let text = stdout(&output);
    assert!(text.contains("Title:       My flag"));
    assert!(text.contains("Offset:      (1, 2)"));

    let output = pxtrack(temp.path(), &["link", "parse", "pxls.space/#template=a.png"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_styles_lists_builtins() {
    let temp = TempDir::new().unwrap();
    let output = pxtrack(temp.path(), &["styles"]);
    assert_success(&output);
    let text = stdout(&output);
    for name in ["none", "dotted", "plus", "bigdotted"] {
        assert!(text.contains(name), "missing style {}", name);
    }
    assert!(text.contains("(default)"));
}

#[test]
fn test_invalid_config_fails() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("pxtrack.toml"), "[render]\nscale = 0\n").unwrap();
    let output = pxtrack(temp.path(), &["styles"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("render.scale"));
}

#[test]
fn test_progress_add_list_record_info() {
    let temp = TempDir::new().unwrap();
    write_art(temp.path());
    // board painted entirely with color 2: the first template column is done
    write_board(temp.path(), 2);
    assert_success(&pxtrack(temp.path(), &["templatize", "art.png", "--style", "dotted"]));

    let image_path = temp.path().join("art_template.png");
    let url = TemplateLink::new("https://pxls.space/", image_path.to_string_lossy(), 4, 2, 3).to_url();
    let canvas = ["progress", "--board", "board.png", "--store", "state.json"];
    let with = |extra: &[&str]| -> Vec<String> {
        canvas.iter().chain(extra.iter()).map(|s| s.to_string()).collect()
    };
    let run = |args: Vec<String>| {
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        pxtrack(temp.path(), &refs)
    };

    let output = run(with(&["check", url.as_str(), "-o", "check.png"]));
    assert_success(&output);
    let text = stdout(&output);
    assert!(text.contains("Progress:    4/16 (25.00%), 12 left"));
    assert!(text.contains("Colors left:"));
    assert!(text.contains("Medium Grey (#888888)"));
    assert_eq!(dimensions(&temp.path().join("check.png")), (4, 4));

    let output = run(with(&["add", "flag", url.as_str(), "--owner", "7"]));
    assert_success(&output);
    assert!(temp.path().join("state.json").exists());

    let output = run(with(&["add", "again", url.as_str(), "--owner", "8"]));
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already tracked as 'flag'"));

    let output = run(with(&["list"]));
    assert_success(&output);
    assert!(stdout(&output).contains("flag"));

    let output = run(with(&["list", "--at", "0 0"]));
    assert!(stdout(&output).contains("No templates"));

    let output = run(with(&["record"]));
    assert_success(&output);
    assert!(stdout(&output).contains("Recorded progress of 2 templates"));

    let output = run(with(&["info", "flag"]));
    assert_success(&output);
    let text = stdout(&output);
    assert!(text.contains("Template:    flag"));
    assert!(text.contains("ETA:"));

    let output = run(with(&["delete", "flag", "--user", "8"]));
    assert_eq!(output.status.code(), Some(1));
    let output = run(with(&["delete", "flag", "--user", "7"]));
    assert_success(&output);
    let output = run(with(&["list"]));
    assert!(stdout(&output).contains("No templates"));
}

#[test]
fn test_progress_unknown_view() {
    let temp = TempDir::new().unwrap();
    write_board(temp.path(), 0);
    let output = pxtrack(
        temp.path(),
        &["progress", "--board", "board.png", "check", "https://pxls.space/#template=a.png&tw=1&ox=0&oy=0", "--view", "heatmap"],
    );
    assert_eq!(output.status.code(), Some(2));
}
