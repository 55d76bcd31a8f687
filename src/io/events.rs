//! CSV event files.
//!
//! One row per detected object, grouped into events by the `event` column:
//!
//! ```text
//! event,kind,pt,eta,phi,mass,btag
//! 0,jet,87.1,0.42,1.30,9.8,1
//! 0,electron,41.0,-0.8,-2.1,0.000511,
//! 0,met,35.2,0,0.7,0,
//! ```
//!
//! `kind` is one of `jet`, `electron`, `muon`, `met`. `mass` and `btag` may be
//! empty. Bad rows are skipped and reported as `RowError`s; an event that does
//! not end up with exactly one `met` row is dropped the same way. Events are
//! numbered by ascending `event` id, and that position is the entry index.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::StringRecord;

use crate::domain::{Event, Jet, Kinematic, Lepton, LeptonFlavor, MissingEnergy};
use crate::error::AppError;

const REQUIRED_COLUMNS: [&str; 5] = ["event", "kind", "pt", "eta", "phi"];

/// Random access to the events of a dataset ("advance to entry N").
pub trait EventSource {
    fn entries(&self) -> usize;
    fn read_entry(&mut self, entry: usize) -> Result<Event, AppError>;
}

/// A row-level problem encountered while reading an event file.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub event: Option<u64>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct CsvEventSource {
    events: Vec<Event>,
    /// Original `event` id of each entry.
    ids: Vec<u64>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

#[derive(Debug, Default)]
struct PendingEvent {
    first_line: usize,
    jets: Vec<Jet>,
    electrons: Vec<Lepton>,
    muons: Vec<Lepton>,
    missing: Vec<MissingEnergy>,
}

enum ObjectRow {
    Jet(Jet),
    Lepton(Lepton),
    Missing(MissingEnergy),
}

impl CsvEventSource {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::input(format!("Failed to open event file '{}': {e}", path.display())))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(input: R) -> Result<Self, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| AppError::input(format!("Failed to read event file headers: {e}")))?
            .clone();
        let header_map = build_header_map(&headers);

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !header_map.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::input(format!(
                "Event file is missing required column(s): {}",
                missing.join(", ")
            )));
        }

        let mut pending: BTreeMap<u64, PendingEvent> = BTreeMap::new();
        let mut row_errors = Vec::new();
        let mut rows_read = 0usize;

        for (idx, result) in reader.records().enumerate() {
            // Header is line 1.
            let line = idx + 2;
            rows_read += 1;

            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    row_errors.push(RowError {
                        line,
                        event: None,
                        message: format!("CSV parse error: {e}"),
                    });
                    continue;
                }
            };

            let event_id = match field(&record, &header_map, "event").map(str::parse::<u64>) {
                Some(Ok(id)) => id,
                Some(Err(_)) | None => {
                    row_errors.push(RowError {
                        line,
                        event: None,
                        message: "Missing or invalid `event` id".to_string(),
                    });
                    continue;
                }
            };

            match parse_object(&record, &header_map) {
                Ok(object) => {
                    let slot = pending.entry(event_id).or_insert_with(|| PendingEvent {
                        first_line: line,
                        ..PendingEvent::default()
                    });
                    match object {
                        ObjectRow::Jet(j) => slot.jets.push(j),
                        ObjectRow::Lepton(l) if l.flavor == LeptonFlavor::Electron => slot.electrons.push(l),
                        ObjectRow::Lepton(l) => slot.muons.push(l),
                        ObjectRow::Missing(m) => slot.missing.push(m),
                    }
                }
                Err(message) => row_errors.push(RowError {
                    line,
                    event: Some(event_id),
                    message,
                }),
            }
        }

        let mut events = Vec::with_capacity(pending.len());
        let mut ids = Vec::with_capacity(pending.len());
        for (id, p) in pending {
            if p.missing.len() != 1 {
                row_errors.push(RowError {
                    line: p.first_line,
                    event: Some(id),
                    message: format!("Event has {} `met` rows; expected exactly 1", p.missing.len()),
                });
                continue;
            }
            events.push(Event {
                entry: events.len(),
                jets: p.jets,
                electrons: p.electrons,
                muons: p.muons,
                missing: p.missing[0],
            });
            ids.push(id);
        }

        Ok(Self {
            events,
            ids,
            row_errors,
            rows_read,
        })
    }

    /// The `event` id an entry was read from.
    pub fn event_id(&self, entry: usize) -> Option<u64> {
        self.ids.get(entry).copied()
    }
}

impl EventSource for CsvEventSource {
    fn entries(&self) -> usize {
        self.events.len()
    }

    fn read_entry(&mut self, entry: usize) -> Result<Event, AppError> {
        self.events.get(entry).cloned().ok_or_else(|| {
            AppError::input(format!(
                "Entry {entry} is out of range (dataset has {} entries)",
                self.events.len()
            ))
        })
    }
}

/// In-memory source, mostly for tests and generated data.
impl EventSource for Vec<Event> {
    fn entries(&self) -> usize {
        self.len()
    }

    fn read_entry(&mut self, entry: usize) -> Result<Event, AppError> {
        self.get(entry)
            .cloned()
            .ok_or_else(|| AppError::input(format!("Entry {entry} is out of range ({} entries)", self.len())))
    }
}

/// Write events in the format `CsvEventSource` reads, using `entry` as the id.
pub fn write_events_csv<W: Write>(output: W, events: &[Event]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(output);
    let io_err = |e: csv::Error| AppError::input(format!("Failed to write event CSV: {e}"));

    writer
        .write_record(["event", "kind", "pt", "eta", "phi", "mass", "btag"])
        .map_err(io_err)?;

    for event in events {
        let id = event.entry.to_string();
        for jet in &event.jets {
            let p4 = jet.p4();
            writer
                .write_record(object_record(&id, "jet", jet.pt(), jet.eta(), p4.phi(), p4.mass(), Some(jet.tagged)))
                .map_err(io_err)?;
        }
        for (kind, leptons) in [("electron", &event.electrons), ("muon", &event.muons)] {
            for lepton in leptons {
                let p4 = lepton.p4();
                writer
                    .write_record(object_record(&id, kind, lepton.pt(), lepton.eta(), p4.phi(), p4.mass(), None))
                    .map_err(io_err)?;
            }
        }
        let met = &event.missing;
        writer
            .write_record(object_record(&id, "met", met.met, met.p4.eta(), met.phi, 0.0, None))
            .map_err(io_err)?;
    }

    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush event CSV: {e}")))
}

fn object_record(id: &str, kind: &str, pt: f64, eta: f64, phi: f64, mass: f64, tag: Option<bool>) -> [String; 7] {
    [
        id.to_string(),
        kind.to_string(),
        format!("{pt:.6}"),
        format!("{eta:.6}"),
        format!("{phi:.6}"),
        format!("{mass:.6}"),
        tag.map(|t| u8::from(t).to_string()).unwrap_or_default(),
    ]
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn field<'r>(record: &'r StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'r str> {
    header_map
        .get(name)
        .and_then(|&idx| record.get(idx))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_number(record: &StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<f64, String> {
    let raw = field(record, header_map, name).ok_or_else(|| format!("Missing `{name}`"))?;
    let value: f64 = raw.parse().map_err(|_| format!("Invalid `{name}`: '{raw}'"))?;
    if !value.is_finite() {
        return Err(format!("Non-finite `{name}`: '{raw}'"));
    }
    Ok(value)
}

fn parse_tag(raw: Option<&str>) -> Result<bool, String> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(format!("Invalid `btag`: '{other}'")),
    }
}

fn parse_object(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<ObjectRow, String> {
    let kind = field(record, header_map, "kind")
        .ok_or_else(|| "Missing `kind`".to_string())?
        .to_ascii_lowercase();

    let pt = parse_number(record, header_map, "pt")?;
    if pt < 0.0 {
        return Err(format!("Negative `pt`: {pt}"));
    }
    let eta = parse_number(record, header_map, "eta")?;
    let phi = parse_number(record, header_map, "phi")?;
    let mass = if field(record, header_map, "mass").is_some() {
        parse_number(record, header_map, "mass")?
    } else {
        0.0
    };

    let object = match kind.as_str() {
        "jet" => {
            let tagged = parse_tag(field(record, header_map, "btag"))?;
            ObjectRow::Jet(Jet::from_pt_eta_phi_m(pt, eta, phi, mass, tagged))
        }
        "electron" => ObjectRow::Lepton(Lepton::from_pt_eta_phi_m(LeptonFlavor::Electron, pt, eta, phi, mass)),
        "muon" => ObjectRow::Lepton(Lepton::from_pt_eta_phi_m(LeptonFlavor::Muon, pt, eta, phi, mass)),
        "met" => ObjectRow::Missing(MissingEnergy::new(pt, eta, phi)),
        other => return Err(format!("Unknown object kind '{other}'")),
    };

    // Finite inputs can still overflow the four-momentum (huge pt or |eta|).
    let p4 = match &object {
        ObjectRow::Jet(j) => j.p4(),
        ObjectRow::Lepton(l) => l.p4(),
        ObjectRow::Missing(m) => m.p4,
    };
    if !p4.is_finite() {
        return Err(format!(
            "Four-momentum of `{kind}` overflows (pt={pt}, eta={eta}, mass={mass})"
        ));
    }
    Ok(object)
}
