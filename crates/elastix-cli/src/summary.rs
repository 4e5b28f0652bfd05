use std::path::Path;

use console::Style;
use elastix_core::{ElastixExecutables, Parameters, Registration, Verbosity};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    path: Style,
    dim: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            path: Style::new().underlined(),
            dim: Style::new().dim().yellow(),
        }
    }
}

/// What a registration run is about to do.
pub struct RunSummary<'a> {
    pub title: &'a str,
    pub inputs: Vec<(&'a str, &'a Path)>,
    pub output: &'a Path,
    pub exes: &'a ElastixExecutables,
    pub params: &'a Parameters,
    pub exact_params: bool,
    pub verbosity: Verbosity,
}

pub fn print_run_summary(summary: &RunSummary) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to(summary.title));
    println!(
        "  {}",
        s.title.apply_to("\u{2550}".repeat(summary.title.chars().count()))
    );
    println!();

    for (label, path) in &summary.inputs {
        println!(
            "  {:<14}{}",
            s.label.apply_to(label),
            s.path.apply_to(path.display())
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(summary.output.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("elastix"),
        s.path.apply_to(summary.exes.elastix.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Tool output"),
        s.value.apply_to(summary.verbosity)
    );
    println!();

    // Parameters
    if summary.exact_params {
        println!(
            "  {}  {}",
            s.header.apply_to("Parameters"),
            s.dim.apply_to("(passed as given)")
        );
    } else {
        println!("  {}", s.header.apply_to("Parameters"));
    }
    for (key, value) in summary.params.iter() {
        println!(
            "    {:<34}{}",
            s.label.apply_to(key),
            s.value.apply_to(value)
        );
    }
    println!();
}

pub fn print_registration_result(result: &Registration) {
    let s = Styles::new();

    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Shape"),
        s.value.apply_to(format!("{:?}", result.deformed.shape()))
    );
    if let Some(t) = result.transform_parameters.transform() {
        println!("    {:<12}{}", s.label.apply_to("Transform"), s.value.apply_to(t));
    }
    for (i, field) in result.fields.iter().enumerate() {
        let label = if result.fields.len() > 1 {
            format!("Field {}", i)
        } else {
            "Field".to_string()
        };
        println!(
            "    {:<12}{}",
            s.label.apply_to(label),
            s.value.apply_to(format!("max |d| = {:.3}", field.max_abs()))
        );
    }
    println!();
}
