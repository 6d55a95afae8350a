// src/report.rs

//! Terminal output for Ritz values.

use std::io;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Colour for a value at `distance` from the target, relative to the farthest one.
fn distance_color(distance: f64, max_distance: f64) -> Color {
    let intensity = if max_distance > 0.0 {
        (1.0 - distance / max_distance).clamp(0.0, 1.0)
    } else {
        1.0
    };
    Color::Rgb((intensity * 255.0) as u8, 0, ((1.0 - intensity) * 255.0) as u8)
}

/// Prints Ritz values in their current order, one per line, coloured from blue (far from
/// `reference`) to red (close). Without a reference the first value is used.
pub fn print_ritz_values(values: &[f64], reference: Option<f64>) -> io::Result<()> {
    let stdout = StandardStream::stdout(ColorChoice::Auto);
    let mut stdout = stdout.lock();
    write_ritz_values(&mut stdout, values, reference)
}

pub fn write_ritz_values<W: WriteColor>(out: &mut W, values: &[f64], reference: Option<f64>) -> io::Result<()> {
    let Some(&first) = values.first() else {
        return writeln!(out, "(no Ritz values)");
    };
    let reference = reference.unwrap_or(first);
    let max_distance = values
        .iter()
        .map(|v| (v - reference).abs())
        .fold(0.0_f64, f64::max);

    for (i, &value) in values.iter().enumerate() {
        let mut color_spec = ColorSpec::new();
        color_spec.set_fg(Some(distance_color((value - reference).abs(), max_distance)));
        out.set_color(&color_spec)?;
        write!(out, "██")?;
        out.reset()?;
        writeln!(out, " {i:>4}  {value:>+.12e}")?;
    }
    Ok(())
}
