use crate::lipid::Lipid;
use crate::membrane::MembraneError;
use crate::splay::SplayPair;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Table};
use itertools::Itertools;
use log::info;
use rustc_hash::FxHashMap;
use std::path::Path;

#[derive(Default, Debug, Clone)]
pub struct MeanStd {
    x: f64,
    x2: f64,
    n: f64,
}

impl MeanStd {
    pub fn add(&mut self, val: f32) {
        let val = val as f64;
        self.x += val;
        self.x2 += val * val;
        self.n += 1.0;
    }

    /// Adds the value if it is finite. NaN markers of undefined values are skipped.
    pub fn add_finite(&mut self, val: f32) {
        if val.is_finite() {
            self.add(val);
        }
    }

    pub fn count(&self) -> usize {
        self.n as usize
    }

    pub fn compute(&self) -> Option<MeanStdResult> {
        if self.n == 0.0 {
            return None;
        }

        let mean = self.x / self.n;
        let x2_n = self.x2 / self.n;
        let m2 = mean * mean;
        let stddev = if x2_n > m2 { (x2_n - m2).sqrt() } else { 0.0 };
        Some(MeanStdResult {
            mean: mean as f32,
            stddev: stddev as f32,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MeanStdResult {
    pub mean: f32,
    pub stddev: f32,
}

impl MeanStdResult {
    fn fmt_opt(v: Option<Self>) -> String {
        v.map(|r| format!("{:>8.3}\t{:>8.3}", r.mean, r.stddev))
            .unwrap_or_else(|| format!("{:>8}\t{:>8}", "--", "--"))
    }
}

/// Statistics of a single lipid species in a single leaflet
#[derive(Default, Debug, Clone)]
pub struct SpeciesStats {
    pub num_lip: MeanStd,
    pub tilt: MeanStd,
    pub area: MeanStd,
    pub coord_number: MeanStd,
    pub mean_curv: MeanStd,
    pub gaussian_curv: MeanStd,
    pub residual: MeanStd,
    pub splay: MeanStd,
    pub num_degenerate: usize,
    num_lip_cur: usize,
}

/// Per leaflet and per species statistics accumulated over frames
#[derive(Default, Debug, Clone)]
pub struct MembraneStats {
    num_frames: usize,
    per_leaflet: [FxHashMap<String, SpeciesStats>; 2],
}

impl MembraneStats {
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn get(&self, leaflet: usize, species: &str) -> Option<&SpeciesStats> {
        self.per_leaflet.get(leaflet)?.get(species)
    }

    /// Adds the lipids of the current frame. Lipids without leaflet are ignored.
    pub fn add_frame(&mut self, lipids: &[Lipid], splay: &[SplayPair]) {
        for st in self.per_leaflet.iter_mut().flat_map(|m| m.values_mut()) {
            st.num_lip_cur = 0;
        }

        for lip in lipids {
            let p = lip.props();
            let Some(l) = p.leaflet else {
                continue;
            };
            let st = self.per_leaflet[l].entry(lip.name().to_owned()).or_default();
            st.num_lip_cur += 1;
            st.coord_number.add(p.coord_number as f32);
            if p.degenerate {
                st.num_degenerate += 1;
            } else {
                st.tilt.add_finite(p.tilt);
                st.area.add_finite(p.area);
                st.mean_curv.add_finite(p.mean_curvature);
                st.gaussian_curv.add_finite(p.gaussian_curvature);
                st.residual.add_finite(p.quad_fit_residual);
            }
        }

        // Splay of the edge counts for both lipids
        for sp in splay {
            for id in [sp.lip1, sp.lip2] {
                let lip = &lipids[id];
                if let Some(l) = lip.props().leaflet {
                    if let Some(st) = self.per_leaflet[l].get_mut(lip.name()) {
                        st.splay.add_finite(sp.splay);
                    }
                }
            }
        }

        for st in self.per_leaflet.iter_mut().flat_map(|m| m.values_mut()) {
            st.num_lip.add(st.num_lip_cur as f32);
        }
        self.num_frames += 1;
    }

    fn sorted_entries(&self) -> impl Iterator<Item = (usize, &String, &SpeciesStats)> + '_ {
        self.per_leaflet.iter().enumerate().flat_map(|(l, m)| {
            m.iter()
                .sorted_by(|a, b| a.0.cmp(b.0))
                .map(move |(sp, st)| (l, sp, st))
        })
    }

    pub fn save_to_file(&self, fname: impl AsRef<Path>) -> Result<(), MembraneError> {
        use std::io::Write;

        if self.num_frames == 0 {
            return Err(MembraneError::NoStats);
        }
        info!("Writing statistics over {} frames...", self.num_frames);

        let mut s = format!(
            "# frames: {}\n#leaflet\tspecies\tnum\tnum_std\ttilt\ttilt_std\tarea\tarea_std\t\
            coord\tcoord_std\tmean_curv\tmean_curv_std\tgauss_curv\tgauss_curv_std\t\
            residual\tresidual_std\tsplay\tsplay_std\tdegenerate\n",
            self.num_frames
        );
        for (l, sp, st) in self.sorted_entries() {
            let cols = [
                &st.num_lip,
                &st.tilt,
                &st.area,
                &st.coord_number,
                &st.mean_curv,
                &st.gaussian_curv,
                &st.residual,
                &st.splay,
            ]
            .iter()
            .map(|m| MeanStdResult::fmt_opt(m.compute()))
            .join("\t");
            s.push_str(&format!("{l}\t{sp}\t{cols}\t{}\n", st.num_degenerate));
        }

        let mut f = std::fs::File::create(fname)?;
        write!(f, "{s}")?;
        Ok(())
    }

    /// Human-readable table of mean values
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(
                ["leaflet", "species", "lipids", "tilt", "area", "coord", "splay", "degenerate"]
                    .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
            );

        let mean = |m: &MeanStd| {
            m.compute()
                .map(|r| format!("{:.3}", r.mean))
                .unwrap_or_else(|| "--".into())
        };

        for (l, sp, st) in self.sorted_entries() {
            table.add_row(vec![
                l.to_string(),
                sp.clone(),
                mean(&st.num_lip),
                mean(&st.tilt),
                mean(&st.area),
                mean(&st.coord_number),
                mean(&st.splay),
                st.num_degenerate.to_string(),
            ]);
        }
        table
    }
}
