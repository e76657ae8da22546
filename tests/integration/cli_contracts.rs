use std::fs;

use dedupfs::tooling::{CliContext, Commands};
use dedupfs::ApiError;
use tempfile::TempDir;

use crate::integration::support::{root_of, with_xdg_env};

fn context(temp_dir: &TempDir, user: &str) -> CliContext {
    CliContext::new(Some(root_of(temp_dir)), Some(user.to_string()), None, true).unwrap()
}

#[test]
fn cli_import_list_cat_stat() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let ctx = context(&temp_dir, "alice");
        let out = ctx.execute(&Commands::Init).unwrap();
        assert!(out.contains("alice"));

        let host = temp_dir.path().join("hello.txt");
        fs::write(&host, b"hello world").unwrap();
        let out = ctx
            .execute(&Commands::Import {
                host: host.clone(),
                inner: "/hello.txt".into(),
                move_source: false,
                ext: Vec::new(),
            })
            .unwrap();
        assert!(out.starts_with("Imported 1 file(s)"));
        assert!(host.exists());

        let listing = ctx
            .execute(&Commands::Ls {
                path: "/".into(),
                format: "json".into(),
            })
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&listing).unwrap();
        assert_eq!(value[0]["name"], "hello.txt");
        assert_eq!(value[0]["kind"], "file");
        assert_eq!(value[0]["size"], 11);

        let text = ctx
            .execute(&Commands::Cat {
                path: "/hello.txt".into(),
            })
            .unwrap();
        assert_eq!(text, "hello world");

        let stat = ctx
            .execute(&Commands::Stat {
                path: "/hello.txt".into(),
                format: "json".into(),
            })
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&stat).unwrap();
        assert_eq!(value["path"], "/hello.txt");
        assert_eq!(value["kind"], "file");
        assert_eq!(
            value["digest"],
            dedupfs::store::hasher::digest_bytes(b"hello world").to_hex()
        );
        assert!(value["metadata"]["created"].is_string());
    });
}

#[test]
fn cli_copy_diff_export_audit() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let ctx = context(&temp_dir, "bob");
        ctx.execute(&Commands::Mkdir {
            path: "/v1".into(),
            parents: false,
        })
        .unwrap();
        let host = temp_dir.path().join("a.txt");
        fs::write(&host, b"a").unwrap();
        ctx.execute(&Commands::Import {
            host,
            inner: "/v1/a.txt".into(),
            move_source: true,
            ext: Vec::new(),
        })
        .unwrap();
        ctx.execute(&Commands::Cp {
            src: "/v1".into(),
            dst: "/v2".into(),
        })
        .unwrap();
        ctx.execute(&Commands::Mv {
            src: "/v2/a.txt".into(),
            dst: "/v2/b.txt".into(),
        })
        .unwrap();

        let diff = ctx
            .execute(&Commands::Diff {
                base: "/v1".into(),
                patch: "/v2".into(),
            })
            .unwrap();
        assert!(diff.contains("-a.txt"));
        assert!(diff.contains("+b.txt"));

        let same = ctx
            .execute(&Commands::Diff {
                base: "/v1".into(),
                patch: "/v1".into(),
            })
            .unwrap();
        assert_eq!(same, "No differences");

        let out_dir = temp_dir.path().join("export");
        ctx.execute(&Commands::Export {
            inner: "/v2".into(),
            host: out_dir.clone(),
            ext: Vec::new(),
        })
        .unwrap();
        assert_eq!(fs::read(out_dir.join("b.txt")).unwrap(), b"a");

        let audit = ctx
            .execute(&Commands::Audit {
                format: "text".into(),
            })
            .unwrap();
        assert!(audit.contains("consistent"));
        assert!(!audit.contains("INCONSISTENT"));

        let out = ctx
            .execute(&Commands::Rm {
                path: "/v1".into(),
                recursive: true,
                force: true,
            })
            .unwrap();
        assert!(out.contains("0 entities reclaimed"));
    });
}

#[test]
fn cli_errors_do_not_commit_partial_state() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let ctx = context(&temp_dir, "carol");
        let err = ctx
            .execute(&Commands::Cat {
                path: "/missing".into(),
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::PathNotFound(_)));

        let err = ctx
            .execute(&Commands::Rm {
                path: "/".into(),
                recursive: true,
                force: true,
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));
    });
}

#[test]
fn cli_uninitialized_root_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let ctx =
            CliContext::new(Some(root_of(&temp_dir)), Some("dave".into()), None, false).unwrap();
        let err = ctx
            .execute(&Commands::Ls {
                path: "/".into(),
                format: "text".into(),
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::RootInvalid(_)));
    });
}

#[test]
fn cli_user_and_layout_come_from_global_config() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let config_dir = temp_dir.path().join("xdg-config").join("dedupfs");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("config.toml"),
            "user = \"configured\"\n\n[layout]\nentities_dir = \"Blobs\"\n",
        )
        .unwrap();

        let ctx = CliContext::new(Some(root_of(&temp_dir)), None, None, true).unwrap();
        assert_eq!(ctx.user(), "configured");
        ctx.execute(&Commands::Init).unwrap();
        assert!(root_of(&temp_dir).join("Blobs").is_dir());
        assert!(root_of(&temp_dir).join("Users").join("configured").is_dir());

        let rendered = ctx.execute(&Commands::Config).unwrap();
        let value: toml::Value = toml::from_str(&rendered).unwrap();
        assert_eq!(value["user"].as_str(), Some("configured"));
        assert_eq!(value["layout"]["entities_dir"].as_str(), Some("Blobs"));

        let explicit = CliContext::new(Some(root_of(&temp_dir)), Some("cli".into()), None, true)
            .unwrap();
        assert_eq!(explicit.user(), "cli");
    });
}

#[test]
fn cli_without_config_defaults_user() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let ctx = CliContext::new(Some(root_of(&temp_dir)), None, None, true).unwrap();
        assert_eq!(ctx.user(), "default");
    });
}
