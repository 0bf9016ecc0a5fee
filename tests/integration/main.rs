//! Integration tests for ctxcrop

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// A throwaway site root, state directory and config file
    struct Site {
        dir: TempDir,
        config: PathBuf,
    }

    impl Site {
        fn new() -> Self {
            Self::with_image_settings("")
        }

        fn with_image_settings(image: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().join("site");
            let state = dir.path().join("state");
            let config = dir.path().join("config.toml");
            fs::write(
                &config,
                format!(
                    "[files]\nroot = '{}'\nbase_url = 'http://example.test'\n\n[image]\n{}\n\n[state]\ndir = '{}'\n",
                    root.display(),
                    image,
                    state.display()
                ),
            )
            .unwrap();
            Self { dir, config }
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("ctxcrop");
            cmd.env_remove("CTXCROP_CONFIG")
                .env("NO_COLOR", "1")
                .arg("--config")
                .arg(&self.config);
            cmd
        }

        fn public(&self, target: &str) -> PathBuf {
            self.dir
                .path()
                .join("site/sites/default/files")
                .join(target)
        }

        fn write_jpeg(&self, target: &str, width: u32, height: u32) {
            let path = self.public(target);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            let img = RgbImage::from_fn(width, height, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, 120])
            });
            DynamicImage::ImageRgb8(img)
                .save_with_format(&path, ImageFormat::Jpeg)
                .unwrap();
        }

        fn out(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }
    }

    fn dimensions(path: &Path) -> (u32, u32) {
        image::image_dimensions(path).unwrap()
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("ctxcrop")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("contextual image-crop derivatives"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("ctxcrop")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("ctxcrop"));
    }

    #[test]
    fn config_path() {
        let site = Site::new();
        site.cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let site = Site::new();
        site.cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[files]"))
            .stdout(predicate::str::contains("http://example.test"));
    }

    #[test]
    fn config_init_refuses_overwrite() {
        let site = Site::new();
        site.cmd()
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let site = Site::with_image_settings("private_key = ''");
        site.cmd()
            .args(["styles"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn styles_lists_defaults() {
        let site = Site::new();
        site.cmd()
            .args(["styles", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("focal_card"))
            .stdout(predicate::str::contains("thumbnail"));
    }

    #[test]
    fn path_output() {
        let site = Site::new();
        site.cmd()
            .args(["path", "public://photos/dog.jpg", "thumbnail"])
            .assert()
            .success()
            .stdout("public://contextual/styles/thumbnail/public/photos/dog__jpg/0.jpg\n");

        site.cmd()
            .args(["path", "public://photos/dog.png", "webp_card", "--crop", "7"])
            .assert()
            .success()
            .stdout("public://contextual/styles/webp_card/public/photos/dog__png/7.webp\n");
    }

    #[test]
    fn url_output() {
        let site = Site::new();
        site.cmd()
            .args(["url", "public://photos/dog.jpg", "thumbnail"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with(
                "http://example.test/sites/default/files/contextual/styles/thumbnail/public/photos/dog__jpg/0.jpg?itok=",
            ));
    }

    #[test]
    fn unknown_style_fails() {
        let site = Site::new();
        site.cmd()
            .args(["path", "public://photos/dog.jpg", "poster"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown image style"))
            .stderr(predicate::str::contains("ctxcrop styles"));
    }

    #[test]
    fn decode_contextual_path() {
        let site = Site::new();
        site.cmd()
            .args([
                "decode",
                "/sites/default/files/contextual/styles/thumbnail/public/photos/dog__jpg/0.jpg",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "/sites/default/files/contextual/styles/thumbnail/0/public",
            ))
            .stdout(predicate::str::contains("public://photos/dog.jpg"));
    }

    #[test]
    fn decode_passthrough() {
        let site = Site::new();
        site.cmd()
            .args(["decode", "/node/5"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Not a contextual derivative"));
    }

    #[test]
    fn deliver_generates_once() {
        let site = Site::new();
        site.write_jpeg("photos/dog.jpg", 400, 200);
        let out = site.out("thumb.jpg");

        site.cmd()
            .args(["deliver", "public://photos/dog.jpg", "thumbnail", "-o"])
            .arg(&out)
            .assert()
            .success()
            .stdout(predicate::str::contains("image/jpeg"))
            .stdout(predicate::str::contains("public"));

        let derivative = site.public("contextual/styles/thumbnail/public/photos/dog__jpg/0.jpg");
        assert!(derivative.exists());
        assert_eq!(dimensions(&out), (100, 50));

        // Second delivery serves the stored file
        site.cmd()
            .args(["deliver", "public://photos/dog.jpg", "thumbnail"])
            .assert()
            .success();
        assert_eq!(fs::read(&derivative).unwrap(), fs::read(&out).unwrap());
    }

    #[test]
    fn deliver_rejects_bad_token() {
        let site = Site::new();
        site.write_jpeg("a.jpg", 20, 20);
        site.cmd()
            .args(["deliver", "public://a.jpg", "thumbnail", "--token", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("HTTP 404"));
        assert!(!site
            .public("contextual/styles/thumbnail/public/a__jpg/0.jpg")
            .exists());
    }

    #[test]
    fn deliver_missing_source_fails() {
        let site = Site::new();
        site.cmd()
            .args(["deliver", "public://missing.jpg", "thumbnail"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("missing source file"));
    }

    #[test]
    fn generation_failure_hides_derivative_path() {
        let site = Site::new();
        let source = site.public("photos/bad.jpg");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"not an image").unwrap();

        site.cmd()
            .args(["deliver", "public://photos/bad.jpg", "thumbnail"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error generating image. (HTTP 500)"))
            .stderr(
                predicate::str::is_match("Error:[^\n]*contextual/styles")
                    .unwrap()
                    .not(),
            );
        assert!(!site
            .public("contextual/styles/thumbnail/public/photos/bad__jpg/0.jpg")
            .exists());
    }

    #[test]
    fn crop_save_then_deliver_by_context() {
        let site = Site::new();
        site.write_jpeg("photos/dog.jpg", 800, 600);

        site.cmd()
            .args([
                "crop",
                "save",
                "public://photos/dog.jpg",
                "focal_card",
                "--context",
                "node:article:5.field_image.0",
                "--settings",
                "25,75",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "/contextual/styles/focal_card/public/photos/dog__jpg/1.jpg?itok=",
            ))
            .stdout(predicate::str::contains("&h="));

        site.cmd()
            .args(["crop", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("node:article:5.field_image.0"))
            .stdout(predicate::str::contains("\"x\": 200"));

        let out = site.out("card.jpg");
        site.cmd()
            .args([
                "deliver",
                "public://photos/dog.jpg",
                "focal_card",
                "--context",
                "node:article:5.field_image.0",
                "-o",
            ])
            .arg(&out)
            .assert()
            .success();

        assert!(site
            .public("contextual/styles/focal_card/public/photos/dog__jpg/1.jpg")
            .exists());
        assert_eq!(dimensions(&out), (400, 250));

        site.cmd()
            .args(["crop", "invalidate", "node:article:5."])
            .assert()
            .success()
            .stdout(predicate::str::contains("Deleted 1 derivative(s)"));
        assert!(!site
            .public("contextual/styles/focal_card/public/photos/dog__jpg/1.jpg")
            .exists());
    }

    #[test]
    fn crop_save_rejects_bad_settings() {
        let site = Site::new();
        site.write_jpeg("a.jpg", 50, 50);
        site.cmd()
            .args([
                "crop",
                "save",
                "public://a.jpg",
                "focal_card",
                "--context",
                "ctx",
                "--settings",
                "150,20",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid crop settings"));
    }

    #[test]
    fn get_decodes_and_delivers() {
        let site = Site::with_image_settings("allow_insecure_derivatives = true");
        site.write_jpeg("photos/dog.jpg", 300, 300);
        let out = site.out("get.jpg");

        site.cmd()
            .args([
                "get",
                "/sites/default/files/contextual/styles/medium/public/photos/dog__jpg/0.jpg",
                "-o",
            ])
            .arg(&out)
            .assert()
            .success();
        assert_eq!(dimensions(&out), (220, 220));
    }

    #[test]
    fn get_rejects_other_paths() {
        let site = Site::new();
        site.cmd()
            .args(["get", "/node/5?itok=abc"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a contextual derivative path"));
    }

    #[test]
    fn private_needs_grant() {
        let site = Site::new();
        let source = site.dir.path().join("site/private/scans/id.jpg");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        DynamicImage::ImageRgb8(RgbImage::new(10, 10))
            .save_with_format(&source, ImageFormat::Jpeg)
            .unwrap();

        site.cmd()
            .args(["deliver", "private://scans/id.jpg", "thumbnail"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Access denied"));

        site.cmd()
            .args(["deliver", "private://scans/id.jpg", "thumbnail", "--grant"])
            .assert()
            .success()
            .stdout(predicate::str::contains("private"))
            .stdout(predicate::str::contains("Cache-Control"));
    }

    #[test]
    fn flush_removes_derivatives() {
        let site = Site::new();
        site.write_jpeg("a.jpg", 40, 40);
        site.cmd()
            .args(["deliver", "public://a.jpg", "thumbnail"])
            .assert()
            .success();
        let derivative = site.public("contextual/styles/thumbnail/public/a__jpg/0.jpg");
        assert!(derivative.exists());

        site.cmd()
            .args(["flush", "thumbnail"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Flushed thumbnail derivatives"));
        assert!(!derivative.exists());
        assert!(site.public("a.jpg").exists());
    }
}
