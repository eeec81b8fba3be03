//! Example: Load and inspect a USDA file.
//!
//! Run with: cargo run --example load_usda -- scene.usda

use std::env;

use stagelink_core::usd::load_usda;
use stagelink_core::PrimPath;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: load_usda <path-to-usda-file>");
        println!("\nExample:");
        println!("  cargo run --example load_usda -- scene.usda");
        return;
    }

    let path = &args[1];
    println!("Loading USDA file: {}", path);

    match load_usda(path) {
        Ok(stage) => {
            let info = stage.stage_info();
            println!("\n=== Stage: {} ===", stage.identifier());
            println!("Up axis: {}", info.up_axis.as_token());
            println!("Meters per unit: {}", info.meters_per_unit);
            println!("Prims: {}", stage.prim_count());
            if let Some(default_prim) = stage.default_prim() {
                println!("Default prim: {}", default_prim);
            }

            println!("\n--- Prims ---");
            for prim_path in stage.descendants(&PrimPath::root()) {
                let depth = prim_path.element_count();
                let type_name = stage.prim_type(&prim_path).unwrap_or("");
                let mut line = format!("{}{} [{}]", "  ".repeat(depth), prim_path.name(), type_name);
                if let Some(kind) = stage.kind(&prim_path) {
                    line.push_str(&format!(" kind={}", kind));
                }
                if !stage.is_active(&prim_path) {
                    line.push_str(" (inactive)");
                }
                if stage.has_time_varying_attributes(&prim_path) {
                    line.push_str(" (animated)");
                }
                println!("{}", line);
            }
        }
        Err(e) => {
            eprintln!("Error loading USDA file: {}", e);
            std::process::exit(1);
        }
    }
}
