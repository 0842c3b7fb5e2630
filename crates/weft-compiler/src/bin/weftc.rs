//! Weft compile-driver CLI.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use weft_compiler::{compile, read_source, CompileRequest, PassthroughCompiler};
use weft_eval::{
    DefaultRenderer, ExecHost, InertExecutor, RenderOptions, SimpleBridge, SourceRenderer,
};
use weft_registry::{Entry, Mode, PackageOptions, Registry, FORCED_MODULE_EXT};

#[derive(Parser, Debug)]
#[command(name = "weftc")]
#[command(about = "Weft module engine - compile and execute a module entry")]
#[command(version)]
struct Args {
    /// Input module source file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Source-type mode for the default package
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    mode: ModeArg,

    /// Full error detail; disables masking
    #[arg(long)]
    debug: bool,

    /// Opt into awaitable top-level execution
    #[arg(long)]
    top_level_await: bool,

    /// Print the final runnable code
    #[arg(long)]
    print_code: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
    Script,
    Auto,
    Module,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Script => Mode::Script,
            ModeArg::Auto => Mode::Auto,
            ModeArg::Module => Mode::Module,
        }
    }
}

fn main() {
    let args = Args::parse();
    if let Err(e) = load(&args) {
        eprintln!("load failed: {:#}", e);
        process::exit(1);
    }
}

fn load(args: &Args) -> anyhow::Result<()> {
    let content = read_source(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let options = PackageOptions {
        debug: args.debug,
        mode: args.mode.into(),
        top_level_await: args.top_level_await,
        ..Default::default()
    };
    let mut reg = Registry::new(options);
    let package = reg.default_package();
    let name = args.input.display().to_string();
    let id = reg.add_entry(Entry::new(name, &args.input, package));

    let mut compiler = PassthroughCompiler;
    let mut bridge = SimpleBridge;
    let mut host = InertExecutor;
    let renderer = DefaultRenderer;
    let mut exec = ExecHost {
        bridge: &mut bridge,
        host: &mut host,
        renderer: &renderer,
    };

    let request = CompileRequest::new(id, &args.input, content);
    let result = compile(&mut reg, &mut compiler, &mut exec, &request, None)?;

    let entry = reg.entry(id);
    println!("module: {}", entry.host.id);
    println!(
        "type: {}",
        if entry.module_type.is_declarative() {
            "declarative"
        } else {
            "dynamic"
        }
    );
    println!("state: {:?}", entry.state);
    if let Some(data) = &entry.compile_data {
        println!("transforms: {:?}", data.transforms);
        if let Some(circular) = data.circular {
            println!("circular: {}", circular);
        }
        if args.print_code {
            let pkg_options = &reg.package(package).options;
            let render_options = RenderOptions {
                async_wrap: pkg_options.top_level_await && entry.extension != FORCED_MODULE_EXT,
                helper_vars: pkg_options.cjs_vars && !entry.module_type.is_declarative(),
                runtime_name: entry.runtime_name.clone(),
                source_map: pkg_options.source_map,
            };
            println!("\n{}", renderer.render(data, &render_options));
        }
    }
    println!("result: {}", result);
    Ok(())
}
