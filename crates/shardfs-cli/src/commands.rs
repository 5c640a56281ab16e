use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use colored::Colorize;
use serde_json::json;
use shardfs_crypto::HashAlgorithm;
use shardfs_store::paths::normalize_root;
use shardfs_store::{Depth, Mode, Store, StoreConfig, StoreOptions, CONFIG_FILE};

use crate::cli::*;

/// Where a command runs and how it reports.
struct Context {
    root: PathBuf,
    format: OutputFormat,
}

impl Context {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Open the store, creating it with defaults if it does not exist.
    fn open_or_create(&self) -> anyhow::Result<Store> {
        Ok(Store::open_default(&self.root)?)
    }

    fn open(&self) -> anyhow::Result<Store> {
        Ok(Store::open_existing(&self.root)?)
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let ctx = Context {
        root: cli.root,
        format: cli.format,
    };
    let ok = match cli.command {
        Command::Init(args) => cmd_init(&ctx, args)?,
        Command::Add(args) => cmd_add(&ctx, args)?,
        Command::Get(args) => cmd_get(&ctx, args)?,
        Command::Path(args) => cmd_path(&ctx, args)?,
        Command::Exists(args) => cmd_exists(&ctx, args)?,
        Command::Rm(args) => cmd_rm(&ctx, args)?,
        Command::Check(args) => cmd_check(&ctx, args)?,
        Command::Fsck(args) => cmd_fsck(&ctx, args)?,
        Command::Ls(args) => cmd_ls(&ctx, args)?,
        Command::Stats => cmd_stats(&ctx)?,
        Command::Config => cmd_config(&ctx)?,
    };
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn cmd_init(ctx: &Context, args: InitArgs) -> anyhow::Result<bool> {
    let mut options = StoreOptions::default();
    if let Some(depth) = args.depth {
        options = options.with_depth(Depth::new(depth)?);
    }
    if let Some(name) = &args.hash_alg {
        options = options.with_hash_alg(name.parse::<HashAlgorithm>()?);
    }
    if let Some(fmode) = &args.fmode {
        options = options.with_fmode(Mode::parse(fmode)?);
    }
    if let Some(dmode) = &args.dmode {
        options = options.with_dmode(Mode::parse(dmode)?);
    }

    let existed = normalize_root(&ctx.root)?.join(CONFIG_FILE).exists();
    let store = Store::open(&ctx.root, options)?;

    if ctx.json() {
        print_json(&json!({
            "root": store.root(),
            "created": !existed,
            "config": store.config(),
        }))?;
    } else if existed {
        println!(
            "{} Store already initialized in {}; keeping its config",
            "!".yellow().bold(),
            store.root().display().to_string().bold()
        );
        print_config(store.config());
    } else {
        println!(
            "{} Initialized store in {}",
            "✓".green().bold(),
            store.root().display().to_string().bold()
        );
        print_config(store.config());
    }
    Ok(true)
}

fn cmd_add(ctx: &Context, args: AddArgs) -> anyhow::Result<bool> {
    let store = ctx.open_or_create()?;
    let mut added = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let digest = if path.as_os_str() == "-" {
            store.add_reader(&mut io::stdin().lock())?
        } else {
            store
                .add_path(path)
                .with_context(|| format!("failed to add {}", path.display()))?
        };
        if !ctx.json() {
            println!("{}  {}", digest.yellow(), path.display());
        }
        added.push(json!({ "path": path, "digest": digest }));
    }
    if ctx.json() {
        print_json(&json!(added))?;
    }
    Ok(true)
}

fn cmd_get(ctx: &Context, args: GetArgs) -> anyhow::Result<bool> {
    let store = ctx.open()?;
    let mut object = store.retrieve(&args.digest)?;
    match &args.output {
        Some(output) => {
            let mut file = File::create(output)
                .with_context(|| format!("cannot create {}", output.display()))?;
            io::copy(&mut object, &mut file)?;
            file.sync_all()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            io::copy(&mut object, &mut stdout)?;
            stdout.flush()?;
        }
    }
    Ok(true)
}

fn cmd_path(ctx: &Context, args: DigestArgs) -> anyhow::Result<bool> {
    let store = ctx.open()?;
    let path = store.path_of(&args.digest)?;
    if ctx.json() {
        print_json(&json!({ "digest": args.digest, "path": path }))?;
    } else {
        println!("{}", path.display());
    }
    Ok(true)
}

fn cmd_exists(ctx: &Context, args: DigestArgs) -> anyhow::Result<bool> {
    let store = ctx.open()?;
    let exists = store.exists(&args.digest)?;
    if ctx.json() {
        print_json(&json!({ "digest": args.digest, "exists": exists }))?;
    } else if exists {
        println!("{} {}", "present".green(), args.digest.yellow());
    } else {
        println!("{} {}", "absent".red(), args.digest.yellow());
    }
    Ok(exists)
}

fn cmd_rm(ctx: &Context, args: DigestArgs) -> anyhow::Result<bool> {
    let store = ctx.open()?;
    store.remove(&args.digest)?;
    if ctx.json() {
        print_json(&json!({ "digest": args.digest, "removed": true }))?;
    } else {
        println!("{} Removed {}", "✓".green(), args.digest.yellow());
    }
    Ok(true)
}

fn cmd_check(ctx: &Context, args: DigestArgs) -> anyhow::Result<bool> {
    let store = ctx.open()?;
    let intact = store.check(&args.digest)?;
    if ctx.json() {
        print_json(&json!({ "digest": args.digest, "intact": intact }))?;
    } else if intact {
        println!("{} {}", "ok".green().bold(), args.digest.yellow());
    } else {
        println!("{} {}", "corrupted".red().bold(), args.digest.yellow());
    }
    Ok(intact)
}

fn cmd_fsck(ctx: &Context, args: FsckArgs) -> anyhow::Result<bool> {
    let store = ctx.open()?;
    let checked = store.count()?;
    let mut corrupted = Vec::new();
    for digest in store.corrupted() {
        let digest = digest?;
        if !ctx.json() {
            println!("{} {}", "corrupted".red().bold(), digest.yellow());
        }
        corrupted.push(digest);
    }
    if args.delete {
        for digest in &corrupted {
            store.remove(digest)?;
        }
    }

    if ctx.json() {
        print_json(&json!({
            "checked": checked,
            "corrupted": corrupted,
            "deleted": args.delete,
        }))?;
    } else if corrupted.is_empty() {
        println!("{} {} objects, no issues.", "✓".green().bold(), checked);
    } else {
        let verb = if args.delete { "removed" } else { "found" };
        println!(
            "{} {} objects, {} corrupted {}.",
            "✗".red().bold(),
            checked,
            corrupted.len(),
            verb
        );
    }
    Ok(corrupted.is_empty())
}

fn cmd_ls(ctx: &Context, args: LsArgs) -> anyhow::Result<bool> {
    let store = ctx.open()?;
    let mut listed = Vec::new();
    for object in store.objects() {
        let object = object?;
        let size = object.size()?;
        if ctx.json() {
            listed.push(json!({
                "digest": object.digest(),
                "size": size,
                "path": object.path(),
            }));
        } else if args.long {
            println!("{}  {:>10}  {}", object.digest().yellow(), size, object.path().display());
        } else {
            println!("{}", object.digest());
        }
    }
    if ctx.json() {
        print_json(&json!(listed))?;
    }
    Ok(true)
}

fn cmd_stats(ctx: &Context) -> anyhow::Result<bool> {
    let store = ctx.open()?;
    let count = store.count()?;
    let size = store.size()?;
    if ctx.json() {
        print_json(&json!({ "root": store.root(), "count": count, "size": size }))?;
    } else {
        println!("Store {}", store.root().display().to_string().bold());
        println!("  Objects: {}", count.to_string().bold());
        println!("  Size:    {} bytes", size.to_string().bold());
    }
    Ok(true)
}

fn cmd_config(ctx: &Context) -> anyhow::Result<bool> {
    let store = ctx.open()?;
    if ctx.json() {
        print_json(&json!(store.config()))?;
    } else {
        println!("Store {}", store.root().display().to_string().bold());
        print_config(store.config());
    }
    Ok(true)
}

fn print_config(config: &StoreConfig) {
    println!("  fmode:    {}", config.fmode.to_string().cyan());
    println!("  dmode:    {}", config.dmode.to_string().cyan());
    println!("  depth:    {}", config.depth.to_string().cyan());
    println!("  hash_alg: {}", config.hash_alg.to_string().cyan());
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn ctx(root: &Path) -> Context {
        Context {
            root: root.to_path_buf(),
            format: OutputFormat::Json,
        }
    }

    fn init(ctx: &Context, depth: Option<i64>, hash_alg: Option<&str>) -> anyhow::Result<bool> {
        cmd_init(
            ctx,
            InitArgs {
                depth,
                hash_alg: hash_alg.map(str::to_string),
                fmode: None,
                dmode: None,
            },
        )
    }

    #[test]
    fn init_then_add_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir.path().join("store"));
        assert!(init(&ctx, Some(2), Some("sha256")).unwrap());

        let input = dir.path().join("input.txt");
        std::fs::write(&input, b"cli content").unwrap();
        assert!(cmd_add(&ctx, AddArgs { paths: vec![input] }).unwrap());

        let store = ctx.open().unwrap();
        assert_eq!(store.config().depth.get(), 2);
        assert_eq!(store.config().hash_alg, HashAlgorithm::Sha256);
        let digest = shardfs_crypto::digest_bytes(HashAlgorithm::Sha256, b"cli content");
        assert!(cmd_exists(&ctx, DigestArgs { digest: digest.clone() }).unwrap());
        assert!(cmd_check(&ctx, DigestArgs { digest: digest.clone() }).unwrap());

        let output = dir.path().join("out.txt");
        cmd_get(
            &ctx,
            GetArgs {
                digest: digest.clone(),
                output: Some(output.clone()),
            },
        )
        .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"cli content");

        assert!(cmd_rm(&ctx, DigestArgs { digest: digest.clone() }).unwrap());
        assert!(!cmd_exists(&ctx, DigestArgs { digest }).unwrap());
    }

    #[test]
    fn init_rejects_bad_options() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir.path().join("store"));
        assert!(init(&ctx, Some(-1), None).is_err());
        assert!(init(&ctx, None, Some("crc32")).is_err());
        assert!(!dir.path().join("store").exists());
    }

    #[test]
    fn read_commands_need_a_store() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let err = cmd_stats(&ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<shardfs_store::StoreError>(),
            Some(shardfs_store::StoreError::Uninitialized(_))
        ));
        assert!(!dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn fsck_reports_and_deletes_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let store = ctx.open_or_create().unwrap();
        let digest = store.add_bytes(b"will rot".to_vec()).unwrap();
        std::fs::write(store.path_of(&digest).unwrap(), b"rotten").unwrap();

        assert!(!cmd_fsck(&ctx, FsckArgs { delete: false }).unwrap());
        assert!(store.exists(&digest).unwrap());
        assert!(!cmd_fsck(&ctx, FsckArgs { delete: true }).unwrap());
        assert!(!store.exists(&digest).unwrap());
        assert!(cmd_fsck(&ctx, FsckArgs { delete: false }).unwrap());
    }
}
