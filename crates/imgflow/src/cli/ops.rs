//! The `imgflow ops` command: list the operators a pipeline may use.

use imgflow_core::processor::{ProcessorFactory, DECODE_OP, SCRIPT_OP, TOCHW_OP};

const PSEUDO_OPS: &[(&str, &str)] = &[
    (DECODE_OP, "decode raw bytes (mode: -1 unchanged, 0 gray, 1 rgb)"),
    (TOCHW_OP, "emit [C,H,W] instead of [H,W,C] (value: 0|1)"),
    (SCRIPT_OP, "run a registered script engine (name: engine)"),
];

/// Execute the ops command.
pub async fn execute() -> anyhow::Result<()> {
    let factory = ProcessorFactory::default();
    for (name, help) in PSEUDO_OPS {
        println!("{:<12} {}", name, help);
    }
    for name in factory.operators().names() {
        println!("{:<12} {}", name, describe(&name));
    }
    Ok(())
}

fn describe(name: &str) -> &'static str {
    match name {
        "resize" => "resize_w + resize_h, or short_size; interpolation 0-4",
        "crop" => "crop_x/crop_y/crop_w/crop_h, or crop_center + crop_w + crop_h",
        "random_crop" => "scale, ratio, final_size; interpolation (default lanczos)",
        "rotate" => "angle or random_range (degrees); resample 0 nearest, 1 bilinear",
        "flip" => "flip_code 0 vertical, >0 horizontal, <0 both; random 0|1",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_is_described() {
        for name in ProcessorFactory::default().operators().names() {
            assert!(!describe(&name).is_empty(), "{} has no description", name);
        }
    }
}
