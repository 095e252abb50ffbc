//! aixm-uuid-subst CLI: replaces AIXM 5.1 feature identifiers with fresh UUIDs.

use aixm_uuid_subst::identifiers::{export_csv, extract_identifiers_from_path};
use aixm_uuid_subst::pretty::pretty_print;
use aixm_uuid_subst::substitution::{SubstitutionParams, substitute};
use aixm_uuid_subst::DateTime;
use clap::Parser;
use env_logger::Env;
use log::info;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process;
use tempfile::NamedTempFile;

#[derive(Parser)]
#[command(
    name = "aixm-uuid-subst",
    version,
    about = "Replaces gml:identifier UUIDs of an AIXM 5.1 basic message and its xlink:href references"
)]
struct Cli {
    /// Remark written into an aixm:annotation of every feature
    #[arg(short, long)]
    remark: Option<String>,

    /// Write the identifier mapping (original -> new) as CSV
    #[arg(long, value_name = "FILE")]
    csv_output_file: Option<PathBuf>,

    /// Re-indent the output (2 spaces)
    #[arg(long)]
    pretty: bool,

    /// Keep gml:id values below aixm:timeSlice unchanged
    #[arg(long)]
    keep_nested_ids: bool,

    /// xsd:dateTime for gml:beginPosition, e.g. 2022-12-24T00:00:00Z
    #[arg(value_name = "EFFECTIVE-DATE")]
    effective_date: String,

    /// AIXM basic message to read
    #[arg(value_name = "INPUT-FILE")]
    input: PathBuf,

    /// Target file (replaced atomically)
    #[arg(value_name = "OUTPUT-FILE")]
    output: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let effective_date: DateTime = cli
        .effective_date
        .parse()
        .map_err(|e| format!("Ungueltiges Datum: {e}"))?;

    let mut params = SubstitutionParams::new(effective_date)
        .with_regenerate_nested_ids(!cli.keep_nested_ids);
    if let Some(remark) = cli.remark {
        params = params.with_remark(remark);
    }

    let maps = extract_identifiers_from_path(&cli.input)
        .map_err(|e| format!("Pass 1 fehlgeschlagen: {e}"))?;
    info!(
        "{} identifier(s), {} gml:id exception(s)",
        maps.identifiers.len(),
        maps.gml_id_exceptions.len()
    );

    if let Some(csv_path) = &cli.csv_output_file {
        let file = File::create(csv_path)
            .map_err(|e| format!("CSV-Datei {}: {e}", csv_path.display()))?;
        export_csv(&maps.identifiers, BufWriter::new(file))
            .map_err(|e| format!("CSV-Export fehlgeschlagen: {e}"))?;
    }

    // Temp-Datei im Zielverzeichnis, damit persist() ein rename ist.
    let dir = output_dir(&cli.output);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| format!("Temp-Datei: {e}"))?;

    let input = File::open(&cli.input)
        .map_err(|e| format!("Eingabe {}: {e}", cli.input.display()))?;
    let mut out = substitute(input, BufWriter::new(tmp.as_file_mut()), &params, &maps)
        .map_err(|e| format!("Pass 2 fehlgeschlagen: {e}"))?;
    out.flush().map_err(|e| format!("Schreibfehler: {e}"))?;
    drop(out);

    if cli.pretty {
        let mut pretty = NamedTempFile::new_in(dir).map_err(|e| format!("Temp-Datei: {e}"))?;
        let file = tmp.as_file_mut();
        file.seek(SeekFrom::Start(0))
            .map_err(|e| format!("Lesefehler: {e}"))?;
        let mut writer = BufWriter::new(pretty.as_file_mut());
        pretty_print(BufReader::new(&*file), &mut writer)
            .map_err(|e| format!("Pretty-Print fehlgeschlagen: {e}"))?;
        writer.flush().map_err(|e| format!("Schreibfehler: {e}"))?;
        drop(writer);
        tmp = pretty;
    }

    tmp.persist(&cli.output)
        .map_err(|e| format!("Ausgabe {}: {}", cli.output.display(), e.error))?;
    info!("written {}", cli.output.display());
    Ok(())
}

fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
