use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use foundation::ViewBounds;
use provenance::{
    DEFAULT_BOUNDS_PADDING_DEG, Granularity, GroupKey, Record, SelectionPlan, aggregate_by,
    cluster_arcs, export, filter_arcs_by_bounds, records_from_slice, select_arcs, summarize,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let mut args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        return Err(usage());
    }

    let cmd = args[1].clone();
    let input = PathBuf::from(&args[2]);
    args.drain(0..3);

    match cmd.as_str() {
        "arcs" => cmd_arcs(input, args),
        "cluster" => cmd_cluster(input, args),
        "aggregate" => cmd_aggregate(input, args),
        "summary" => cmd_summary(input, args),
        "export" => cmd_export(input, args),
        _ => Err(usage()),
    }
}

struct Dataset {
    records: Vec<Record>,
    content_hash: String,
}

fn load(input: &Path) -> Result<Dataset, String> {
    let bytes = fs::read(input).map_err(|e| format!("read {input:?}: {e}"))?;
    let records = records_from_slice(&bytes).map_err(|e| format!("{input:?}: {e}"))?;
    Ok(Dataset {
        records,
        content_hash: blake3::hash(&bytes).to_hex().to_string(),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let payload = serde_json::to_string_pretty(value).map_err(|e| format!("json: {e}"))?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{payload}").map_err(|e| format!("stdout: {e}"))
}

/// Pull the value following a flag.
fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_f64(raw: &str, what: &str) -> Result<f64, String> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid {what} {raw:?}: {e}"))
}

/// `N,S,E,W` in degrees.
fn parse_bounds(raw: &str) -> Result<ViewBounds, String> {
    let parts: Vec<&str> = raw.split(',').collect();
    let [n, s, e, w] = parts.as_slice() else {
        return Err(format!("--bounds expects N,S,E,W, got {raw:?}"));
    };
    Ok(ViewBounds::new(
        parse_f64(n, "north")?,
        parse_f64(s, "south")?,
        parse_f64(e, "east")?,
        parse_f64(w, "west")?,
    ))
}

/// Negative caps mean "uncapped", same as zero.
fn parse_max_arcs(raw: &str) -> Result<usize, String> {
    let v: i64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("invalid --max-arcs {raw:?}: {e}"))?;
    Ok(usize::try_from(v).unwrap_or(0))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArcsOutput<'a> {
    plan: SelectionPlan,
    arcs: Vec<provenance::MapArc<'a>>,
}

fn cmd_arcs(input: PathBuf, args: Vec<String>) -> Result<(), String> {
    // provmap arcs <records.json> --zoom Z [--bounds N,S,E,W] [--padding P]
    let mut zoom: Option<f64> = None;
    let mut bounds: Option<ViewBounds> = None;
    let mut padding = DEFAULT_BOUNDS_PADDING_DEG;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--zoom" => zoom = Some(parse_f64(flag_value(&args, &mut i, "--zoom")?, "zoom")?),
            "--bounds" => bounds = Some(parse_bounds(flag_value(&args, &mut i, "--bounds")?)?),
            "--padding" => {
                padding = parse_f64(flag_value(&args, &mut i, "--padding")?, "padding")?
            }
            other => return Err(format!("unknown arg: {other}\n\n{}", usage())),
        }
        i += 1;
    }
    let zoom = zoom.ok_or_else(|| "arcs requires --zoom".to_string())?;

    let data = load(&input)?;
    let mut arcs = select_arcs(&data.records, zoom, bounds.as_ref());
    if let Some(b) = &bounds {
        arcs = filter_arcs_by_bounds(arcs, b, padding);
    }

    eprintln!(
        "{} records -> {} arcs (blake3={})",
        data.records.len(),
        arcs.len(),
        data.content_hash
    );
    print_json(&ArcsOutput {
        plan: SelectionPlan::for_zoom(zoom),
        arcs,
    })
}

fn cmd_cluster(input: PathBuf, args: Vec<String>) -> Result<(), String> {
    // provmap cluster <records.json> --granularity G [--max-arcs K]
    let mut granularity = Granularity::Object;
    let mut max_arcs = 0usize;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--granularity" => {
                granularity = flag_value(&args, &mut i, "--granularity")?
                    .parse()
                    .map_err(|e| format!("{e}"))?
            }
            "--max-arcs" => max_arcs = parse_max_arcs(flag_value(&args, &mut i, "--max-arcs")?)?,
            other => return Err(format!("unknown arg: {other}\n\n{}", usage())),
        }
        i += 1;
    }

    let data = load(&input)?;
    let arcs = cluster_arcs(&data.records, granularity, max_arcs);
    eprintln!(
        "{} records -> {} {granularity} arcs",
        data.records.len(),
        arcs.len()
    );
    print_json(&arcs)
}

fn cmd_aggregate(input: PathBuf, args: Vec<String>) -> Result<(), String> {
    // provmap aggregate <records.json> [--by KEY]
    let mut key = GroupKey::OriginCountry;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--by" => {
                key = flag_value(&args, &mut i, "--by")?
                    .parse()
                    .map_err(|e| format!("{e}"))?
            }
            other => return Err(format!("unknown arg: {other}\n\n{}", usage())),
        }
        i += 1;
    }

    let data = load(&input)?;
    let groups = aggregate_by(&data.records, key);
    eprintln!("{} {} groups", groups.len(), key.as_str());
    print_json(&groups)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryOutput {
    #[serde(flatten)]
    summary: provenance::Summary,
    content_hash: String,
}

fn cmd_summary(input: PathBuf, args: Vec<String>) -> Result<(), String> {
    // provmap summary <records.json>
    if let Some(other) = args.first() {
        return Err(format!("unknown arg: {other}\n\n{}", usage()));
    }
    let data = load(&input)?;
    print_json(&SummaryOutput {
        summary: summarize(&data.records),
        content_hash: data.content_hash,
    })
}

fn cmd_export(input: PathBuf, args: Vec<String>) -> Result<(), String> {
    // provmap export <records.json> <out.csv>
    let [output] = args.as_slice() else {
        return Err(usage());
    };
    let output = PathBuf::from(output);
    if output.exists() {
        return Err(format!("output already exists: {output:?}"));
    }

    let data = load(&input)?;
    let file = fs::File::create(&output).map_err(|e| format!("create {output:?}: {e}"))?;
    export::write_records_csv(&data.records, io::BufWriter::new(file))
        .map_err(|e| format!("write {output:?}: {e}"))?;

    eprintln!("wrote {} ({} records)", output.display(), data.records.len());
    Ok(())
}

fn usage() -> String {
    let exe = env::args().next().unwrap_or_else(|| "provmap".to_string());
    format!(
        "Usage:\n  {exe} arcs <records.json> --zoom Z [--bounds N,S,E,W] [--padding DEG]\n  {exe} cluster <records.json> [--granularity object|city|country] [--max-arcs K]\n  {exe} aggregate <records.json> [--by origin-country|origin-city|destination-country|destination-city|institution]\n  {exe} summary <records.json>\n  {exe} export <records.json> <out.csv>\n\nNotes:\n- Input is a JSON array of records; malformed entries are skipped.\n- Object-level arcs are keyed at 4 decimal places (about 11 m).\n- --max-arcs 0 (or negative) means uncapped.\n- Set RUST_LOG=debug for engine diagnostics on stderr.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::{flag_value, parse_bounds, parse_max_arcs};

    #[test]
    fn bounds_parse_in_nsew_order() {
        let b = parse_bounds("10, 0, 20, -5").unwrap();
        assert_eq!((b.north, b.south, b.east, b.west), (10.0, 0.0, 20.0, -5.0));
        assert!(parse_bounds("1,2,3").is_err());
        assert!(parse_bounds("a,b,c,d").is_err());
    }

    #[test]
    fn non_positive_caps_are_uncapped() {
        assert_eq!(parse_max_arcs("25").unwrap(), 25);
        assert_eq!(parse_max_arcs("0").unwrap(), 0);
        assert_eq!(parse_max_arcs("-3").unwrap(), 0);
        assert!(parse_max_arcs("many").is_err());
    }

    #[test]
    fn flag_without_value_is_an_error() {
        let args = vec!["--zoom".to_string()];
        let mut i = 0;
        assert!(flag_value(&args, &mut i, "--zoom").is_err());

        let args = vec!["--zoom".to_string(), "3".to_string()];
        let mut i = 0;
        assert_eq!(flag_value(&args, &mut i, "--zoom").unwrap(), "3");
        assert_eq!(i, 1);
    }
}
