//! Material/color matching of print jobs against idle printers (AMS slots).
//!
//! The matcher is a first-fit scan: printers are visited in the order the
//! caller supplies and the first one that can serve every required color is
//! returned. No cross-printer optimisation is attempted.

use crate::color::{color_distance, parse_hex};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// A slot matches a required color only if its CIEDE2000 distance is
/// strictly below this value.
pub const COLOR_TOLERANCE: f64 = 5.0;

/// Number of slots per AMS unit; the flat index is `unit * 4 + slot`.
pub const SLOTS_PER_UNIT: i32 = 4;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read-only view of one loaded material slot.
pub trait LoadedSlot {
    /// Physical AMS unit index.
    fn unit_index(&self) -> i32;
    /// Slot index within the unit.
    fn slot_index(&self) -> i32;
    /// Loaded material type, e.g. `PLA`.
    fn material(&self) -> Option<&str>;
    /// Loaded color as hex, optionally with a trailing alpha byte.
    fn color(&self) -> Option<&str>;

    /// Printer-wide slot identifier used in print commands.
    fn flat_index(&self) -> i32 {
        flat_slot_index(self.unit_index(), self.slot_index())
    }
}

/// Read-only view of an idle printer and its slots.
pub trait FleetPrinter {
    type Slot: LoadedSlot;

    fn serial(&self) -> &str;
    fn slots(&self) -> &[Self::Slot];
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilamentMatch {
    pub printer_serial: String,
    /// `ams_mapping[i]` is the flat slot index serving `required_colors[i]`.
    pub ams_mapping: Vec<i32>,
}

/// Compute the flat slot index for a unit/slot pair.
pub fn flat_slot_index(unit_index: i32, slot_index: i32) -> i32 {
    unit_index * SLOTS_PER_UNIT + slot_index
}

/// Find the first printer that can satisfy the material and every color.
///
/// For each printer the slots are first narrowed to those loaded with
/// `required_material` (case-insensitive) and carrying a non-empty color.
/// Each required color then takes the closest of those slots, provided the
/// distance is below [`COLOR_TOLERANCE`]. Slots are not reserved between
/// colors, so one slot may serve two required colors.
pub fn find_printer_for_job<'a, P, I>(
    printers: I,
    required_material: &str,
    required_colors: &[String],
) -> Option<FilamentMatch>
where
    P: FleetPrinter + 'a,
    I: IntoIterator<Item = &'a P>,
{
    printers
        .into_iter()
        .find_map(|printer| match_printer(printer, required_material, required_colors))
}

/// Try to map every required color onto one printer's slots.
pub fn match_printer<P: FleetPrinter>(
    printer: &P,
    required_material: &str,
    required_colors: &[String],
) -> Option<FilamentMatch> {
    if printer.slots().is_empty() {
        return None;
    }

    let candidates: Vec<&P::Slot> = printer
        .slots()
        .iter()
        .filter(|slot| {
            slot.material()
                .is_some_and(|m| m.eq_ignore_ascii_case(required_material))
                && slot.color().is_some_and(|c| !c.is_empty())
        })
        .collect();

    if candidates.len() < required_colors.len() {
        return None;
    }

    let ams_mapping = required_colors
        .iter()
        .map(|required| closest_slot(&candidates, required))
        .collect::<Option<Vec<i32>>>()?;

    Some(FilamentMatch {
        printer_serial: printer.serial().to_string(),
        ams_mapping,
    })
}

/// Flat index of the slot closest to `required`, if any is within tolerance.
///
/// Ties keep the earlier slot.
fn closest_slot<S: LoadedSlot>(candidates: &[&S], required: &str) -> Option<i32> {
    let mut best: Option<(f64, i32)> = None;
    for slot in candidates {
        let Some(color) = slot.color() else { continue };
        if let Err(e) = parse_hex(color) {
            tracing::debug!(
                slot = slot.flat_index(),
                color = %color,
                error = %e,
                "Loaded slot color is malformed",
            );
        }
        let distance = color_distance(required, color);
        if distance < best.map_or(COLOR_TOLERANCE, |(d, _)| d) {
            best = Some((distance, slot.flat_index()));
        }
    }
    best.map(|(_, index)| index)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Slot {
        unit: i32,
        slot: i32,
        material: Option<&'static str>,
        color: Option<&'static str>,
    }

    impl LoadedSlot for Slot {
        fn unit_index(&self) -> i32 {
            self.unit
        }
        fn slot_index(&self) -> i32 {
            self.slot
        }
        fn material(&self) -> Option<&str> {
            self.material
        }
        fn color(&self) -> Option<&str> {
            self.color
        }
    }

    struct Printer {
        serial: &'static str,
        slots: Vec<Slot>,
    }

    impl FleetPrinter for Printer {
        type Slot = Slot;

        fn serial(&self) -> &str {
            self.serial
        }
        fn slots(&self) -> &[Slot] {
            &self.slots
        }
    }

    fn slot(unit: i32, slot: i32, material: &'static str, color: &'static str) -> Slot {
        Slot {
            unit,
            slot,
            material: Some(material),
            color: Some(color),
        }
    }

    fn colors(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn flat_index_combines_unit_and_slot() {
        assert_eq!(flat_slot_index(0, 0), 0);
        assert_eq!(flat_slot_index(0, 3), 3);
        assert_eq!(flat_slot_index(1, 0), 4);
        assert_eq!(flat_slot_index(3, 2), 14);
    }

    #[test]
    fn single_red_slot_matches() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![slot(0, 0, "PLA", "FF0000FF")],
        }];
        let m = find_printer_for_job(&fleet, "PLA", &colors(&["#FF0000"])).unwrap();
        assert_eq!(m.printer_serial, "P1");
        assert_eq!(m.ams_mapping, vec![0]);
    }

    #[test]
    fn material_comparison_ignores_case() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![slot(1, 2, "pla", "FF0000")],
        }];
        let m = find_printer_for_job(&fleet, "PLA", &colors(&["#FF0000"])).unwrap();
        assert_eq!(m.ams_mapping, vec![6]);
    }

    #[test]
    fn wrong_material_never_matches() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![slot(0, 0, "PETG", "FF0000")],
        }];
        assert!(find_printer_for_job(&fleet, "PLA", &colors(&["#FF0000"])).is_none());
    }

    #[test]
    fn malformed_slot_color_is_skipped_in_favour_of_a_valid_one() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![
                slot(0, 0, "PLA", "a\u{e9}\u{e9}\u{e9}b"),
                slot(0, 1, "PLA", "not-hex!"),
                slot(0, 2, "PLA", "FF0000"),
            ],
        }];
        let m = find_printer_for_job(&fleet, "PLA", &colors(&["#FF0000", "#FF0000"])).unwrap();
        assert_eq!(m.ams_mapping, vec![2, 2]);

        let only_bad = vec![Printer {
            serial: "P2",
            slots: vec![slot(0, 0, "PLA", "a\u{e9}\u{e9}\u{e9}b")],
        }];
        assert!(find_printer_for_job(&only_bad, "PLA", &colors(&["#FF0000"])).is_none());
    }

    #[test]
    fn distant_color_is_rejected() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![slot(0, 0, "PLA", "0000FF")],
        }];
        assert!(find_printer_for_job(&fleet, "PLA", &colors(&["#FF0000"])).is_none());
    }

    #[test]
    fn slots_without_color_are_ignored() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![
                Slot {
                    unit: 0,
                    slot: 0,
                    material: Some("PLA"),
                    color: None,
                },
                slot(0, 1, "PLA", ""),
            ],
        }];
        assert!(find_printer_for_job(&fleet, "PLA", &colors(&["#FF0000"])).is_none());
    }

    #[test]
    fn printer_without_slots_is_skipped() {
        let fleet = vec![
            Printer {
                serial: "EMPTY",
                slots: vec![],
            },
            Printer {
                serial: "P2",
                slots: vec![slot(0, 0, "PLA", "FFFFFF")],
            },
        ];
        let m = find_printer_for_job(&fleet, "PLA", &[]).unwrap();
        assert_eq!(m.printer_serial, "P2");
        assert!(m.ams_mapping.is_empty());
    }

    #[test]
    fn picks_the_closest_slot() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![
                slot(0, 0, "PLA", "F01010"),
                slot(0, 1, "PLA", "FF1000"),
                slot(0, 2, "PLA", "0000FF"),
            ],
        }];
        let m = find_printer_for_job(&fleet, "PLA", &colors(&["FF0000"])).unwrap();
        assert_eq!(m.ams_mapping, vec![1]);
    }

    #[test]
    fn first_fit_wins_over_better_later_printer() {
        let fleet = vec![
            Printer {
                serial: "FIRST",
                slots: vec![slot(0, 0, "PLA", "F01010")],
            },
            Printer {
                serial: "EXACT",
                slots: vec![slot(0, 0, "PLA", "FF0000")],
            },
        ];
        let m = find_printer_for_job(&fleet, "PLA", &colors(&["FF0000"])).unwrap();
        assert_eq!(m.printer_serial, "FIRST");
    }

    #[test]
    fn falls_through_to_next_printer() {
        let fleet = vec![
            Printer {
                serial: "BLUE",
                slots: vec![slot(0, 0, "PLA", "0000FF")],
            },
            Printer {
                serial: "RED",
                slots: vec![slot(0, 3, "PLA", "FF0000")],
            },
        ];
        let m = find_printer_for_job(&fleet, "PLA", &colors(&["FF0000"])).unwrap();
        assert_eq!(m.printer_serial, "RED");
        assert_eq!(m.ams_mapping, vec![3]);
    }

    #[test]
    fn too_few_qualifying_slots_rejects_printer() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![slot(0, 0, "PLA", "FF0000"), slot(0, 1, "PETG", "0000FF")],
        }];
        let wanted = colors(&["FF0000", "0000FF"]);
        assert!(find_printer_for_job(&fleet, "PLA", &wanted).is_none());
    }

    #[test]
    fn one_slot_may_serve_two_colors() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![slot(0, 0, "PLA", "FF0000"), slot(0, 1, "PLA", "00FF00")],
        }];
        let wanted = colors(&["FF0000", "FF1000"]);
        let m = find_printer_for_job(&fleet, "PLA", &wanted).unwrap();
        assert_eq!(m.ams_mapping, vec![0, 0]);
    }

    #[test]
    fn multi_color_mapping_follows_requirement_order() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![
                slot(0, 0, "PLA", "FFFFFF"),
                slot(0, 1, "PLA", "0000FF"),
                slot(1, 0, "PLA", "FF0000"),
            ],
        }];
        let wanted = colors(&["#FF0000", "#0000FF", "#FFFFFF"]);
        let m = find_printer_for_job(&fleet, "PLA", &wanted).unwrap();
        assert_eq!(m.ams_mapping, vec![4, 1, 0]);
    }

    #[test]
    fn every_selected_slot_satisfies_requirements() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![
                slot(0, 0, "PLA", "FA0505"),
                slot(0, 1, "PLA", "00F000"),
                slot(0, 2, "ABS", "FF0000"),
            ],
        }];
        let wanted = colors(&["FF0000", "00FF00"]);
        let m = find_printer_for_job(&fleet, "pla", &wanted).unwrap();
        let slots = &fleet[0].slots;
        for (required, index) in wanted.iter().zip(&m.ams_mapping) {
            let chosen = slots.iter().find(|s| s.flat_index() == *index).unwrap();
            assert!(chosen.material().unwrap().eq_ignore_ascii_case("pla"));
            assert!(color_distance(required, chosen.color().unwrap()) < COLOR_TOLERANCE);
        }
    }

    #[test]
    fn malformed_slot_color_never_matches() {
        let fleet = vec![Printer {
            serial: "P1",
            slots: vec![slot(0, 0, "PLA", "not-a-color")],
        }];
        assert!(find_printer_for_job(&fleet, "PLA", &colors(&["FF0000"])).is_none());
    }
}
