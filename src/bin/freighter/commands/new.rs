//! `freighter new` command.
//!
//! Scaffolds an application directory: a starter `Freighter.toml`, a local
//! starter template the create stage can materialize, and a .gitignore.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use freighter::config::Manifest;
use freighter::core::Platform;

use crate::cli::NewArgs;

pub fn execute(args: NewArgs) -> Result<()> {
    let path = args.path.unwrap_or_else(|| PathBuf::from(&args.name));

    if path.exists() {
        bail!("destination `{}` already exists", path.display());
    }
    if !is_valid_name(&args.name) {
        bail!(
            "invalid application name `{}`: use lowercase letters, digits, and dashes",
            args.name
        );
    }

    let bundle = args
        .bundle
        .unwrap_or_else(|| format!("com.example.{}", args.name.replace('-', "")));

    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;

    write_manifest(&path, &args.name, &bundle)?;
    write_starter_template(&path)?;

    std::fs::write(path.join(".gitignore"), "# Freighter outputs\nbuild/\n")?;

    eprintln!("     Created application `{}`", args.name);
    eprintln!("          Run `freighter create` inside it to materialize a skeleton");
    Ok(())
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
}

fn write_manifest(path: &Path, name: &str, bundle: &str) -> Result<()> {
    let default_target = Platform::host()
        .map(|p| format!("{}:app", p))
        .unwrap_or_else(|| "linux:app".to_string());

    let manifest = format!(
        r#"[app]
name = "{name}"
bundle = "{bundle}"
version = "0.1.0"
description = "A freighter application"
targets = ["{target}"]

[app.template]
path = "template"

# Lifecycle commands run from the project root; see `freighter doctor`
# for the tools they require.
# build-command = ["make", "dist"]
# package-command = ["make", "package"]
"#,
        name = name,
        bundle = bundle,
        target = default_target,
    );

    std::fs::write(path.join(Manifest::FILE_NAME), manifest)
        .with_context(|| "failed to write Freighter.toml")?;
    Ok(())
}

fn write_starter_template(path: &Path) -> Result<()> {
    let template_dir = path.join("template");
    let content_dir = template_dir.join("content");
    std::fs::create_dir_all(content_dir.join("app"))
        .with_context(|| "failed to create template directory")?;

    // The starter template accepts any 0.x orchestrator.
    std::fs::write(
        template_dir.join("template.toml"),
        "[template]\nname = \"starter\"\nversion = \"0.1.0\"\ncompat = \">=0.1.0, <1.0.0\"\n",
    )?;

    std::fs::write(
        content_dir.join("README.md"),
        "# {{app_name}}\n\nVersion {{version}}, packaged for {{platform}}:{{format}}.\n",
    )?;

    std::fs::write(
        content_dir.join("app/main.py"),
        "print(\"Hello from {{app_name}} {{version}}\")\n",
    )?;

    Ok(())
}
