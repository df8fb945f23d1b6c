use crate::core::{Pos, Vector3f};
use std::path::Path;

/// Buffer of VMD Tcl drawing commands.
/// Input coordinates are in nm, output is in Angstroms.
#[derive(Debug, Default)]
pub struct VmdVisual {
    buf: String,
}

const NM_TO_ANGSTROM: f32 = 10.0;

fn fmt_point(p: &Pos) -> String {
    format!("\"{} {} {}\"", p.x, p.y, p.z)
}

impl VmdVisual {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn save_to_file(&self, fname: impl AsRef<Path>) -> std::io::Result<()> {
        use std::io::Write;
        let mut f = std::fs::File::create(fname)?;
        writeln!(f, "{}", self.buf)?;
        Ok(())
    }

    pub fn comment(&mut self, text: &str) {
        self.buf.push_str(&format!("# {text}\n"));
    }

    fn color(&mut self, color: &str) {
        self.buf.push_str(&format!("draw color {color}\n"));
    }

    /// Arrow of `length` Angstroms from `point` along `dir`
    pub fn arrow(&mut self, point: &Pos, dir: &Vector3f, length: f32, color: &str) {
        let p1 = point * NM_TO_ANGSTROM;
        let p2 = p1 + dir * 0.7 * length;
        let p3 = p1 + dir * length;

        self.color(color);
        self.buf.push_str(&format!(
            "draw cylinder {} {} radius 0.2 resolution 12\n",
            fmt_point(&p1),
            fmt_point(&p2)
        ));
        self.buf.push_str(&format!(
            "draw cone {} {} radius 0.4 resolution 12\n",
            fmt_point(&p2),
            fmt_point(&p3)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_in_angstroms() {
        let mut v = VmdVisual::new();
        v.arrow(&Pos::new(0.5, 0.25, 0.125), &Vector3f::z(), 8.0, "red");
        let s = v.as_str();
        assert!(s.starts_with("draw color red\n"));
        assert!(s.contains("draw cylinder \"5 2.5 1.25\""));
        assert!(s.contains("\"5 2.5 9.25\" radius 0.4"));
    }
}
