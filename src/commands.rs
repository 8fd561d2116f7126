use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use polars::prelude::*;

use crate::cli::{Cli, MatrixArgs, MatrixSource, PopulationArgs};
use crate::common::data::{read_from_csv, read_from_parquet, write_to_parquet};
use crate::common::fs::{ensure_dir_exists, extract_zip, require_file_exists};
use crate::config::DataPaths;
use crate::hex::HEX_RESOLUTION;
use crate::matrix::{get_or_build, MatrixBuilder, WeightMatrix};
use crate::pipeline::health::aggregate_health;
use crate::pipeline::internet::{build_internet_table, MODALITIES, QUARTERS};
use crate::pipeline::population::aggregate_population;
use crate::sources::grid::parse_grid_id;
use crate::sources::quadkey::parse_quadkey;
use crate::sources::SourcePolygon;

fn load_paths(cli: &Cli) -> Result<DataPaths> {
    if let Some(config) = &cli.config {
        DataPaths::from_file(config)
    } else if let Some(root) = &cli.data_dir {
        Ok(DataPaths::under(root))
    } else {
        Ok(DataPaths::default())
    }
}

/// Read a tabular input by extension (csv or parquet).
fn read_table(path: &Path) -> Result<DataFrame> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => read_from_csv(path),
        Some("parquet") => read_from_parquet(path),
        other => Err(anyhow!("unsupported table format {:?}: {}", other, path.display())),
    }
}

/// Decode the distinct grid ids of the census table into source squares.
fn grid_sources_from(census: &DataFrame, verbose: u8) -> Result<Vec<SourcePolygon>> {
    let key = if census.column("grid_id").is_ok() { "grid_id" } else { "GRD_ID" };
    let ids = census.column(key)?.str()?;

    let unique: BTreeSet<&str> = ids.into_no_null_iter().collect();
    let mut sources = Vec::with_capacity(unique.len());
    let mut unparsable = 0usize;
    for id in unique {
        match parse_grid_id(id) {
            Ok(source) => sources.push(source),
            Err(_) => unparsable += 1,
        }
    }
    if verbose > 0 && unparsable > 0 {
        eprintln!("[matrix] grid: {unparsable} unparsable grid ids skipped");
    }
    Ok(sources)
}

/// Scan the quarterly tile tables for distinct quadkeys and decode them.
fn quadkey_sources(internet_dir: &Path, verbose: u8) -> Result<Vec<SourcePolygon>> {
    let mut unique: BTreeSet<String> = BTreeSet::new();
    for &(year, quarter) in QUARTERS {
        for modality in MODALITIES {
            let path = internet_dir.join(format!("{year}_q{quarter}_{modality}.parquet"));
            if !path.exists() {
                continue;
            }
            let table = read_from_parquet(&path)?;
            let keys = table.column("quadkey")?.cast(&DataType::String)?;
            for key in keys.str()?.into_no_null_iter() {
                unique.insert(key.to_string());
            }
        }
    }
    if unique.is_empty() {
        anyhow::bail!("No tile tables found under {}", internet_dir.display());
    }

    let mut sources = Vec::with_capacity(unique.len());
    let mut unparsable = 0usize;
    for key in &unique {
        match parse_quadkey(key) {
            Ok(source) => sources.push(source),
            Err(_) => unparsable += 1,
        }
    }
    if verbose > 0 && unparsable > 0 {
        eprintln!("[matrix] quadkey: {unparsable} unparsable quadkeys skipped");
    }
    Ok(sources)
}

/// Cache-first matrix access shared by the stage commands.
fn build_matrix<F>(path: &Path, label: &str, verbose: u8, load_sources: F) -> Result<WeightMatrix>
where
    F: FnOnce() -> Result<Vec<SourcePolygon>>,
{
    let (matrix, stats) = get_or_build(path, HEX_RESOLUTION, || {
        let sources = load_sources()?;
        if verbose > 0 {
            eprintln!("[matrix] {label}: intersecting {} source geometries", sources.len());
        }
        MatrixBuilder::new().build(&sources)
    })?;

    match stats {
        Some(stats) => println!(
            "Built {label} matrix: {} entries from {} sources ({} skipped) -> {}",
            stats.entries,
            stats.sources,
            stats.skipped,
            path.display()
        ),
        None => println!("{label} matrix up to date: {} entries ({})", matrix.len(), path.display()),
    }
    Ok(matrix)
}

pub fn matrix(cli: &Cli, args: &MatrixArgs) -> Result<()> {
    let paths = load_paths(cli)?;
    match args.source {
        MatrixSource::Grid => {
            require_file_exists(&paths.census_table)?;
            let census = read_table(&paths.census_table)?;
            build_matrix(&paths.grid_matrix, "grid", cli.verbose, || {
                grid_sources_from(&census, cli.verbose)
            })?;
        }
        MatrixSource::Quadkey => {
            build_matrix(&paths.quadkey_matrix, "quadkey", cli.verbose, || {
                quadkey_sources(&paths.internet_dir, cli.verbose)
            })?;
        }
    }
    Ok(())
}

/// Locate the census table, extracting it from an archive first if asked.
fn census_table_path(paths: &DataPaths, zip: &Option<PathBuf>) -> Result<PathBuf> {
    let Some(zip) = zip else {
        return Ok(paths.census_table.clone());
    };
    let dest = paths
        .census_table
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    ensure_dir_exists(dest)?;
    let extracted = extract_zip(zip, dest, "csv")?;
    extracted
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No csv table found in archive {}", zip.display()))
}

pub fn population(cli: &Cli, args: &PopulationArgs) -> Result<()> {
    let paths = load_paths(cli)?;
    if paths.population_out.exists() {
        println!("Population table already exists: {}", paths.population_out.display());
        return Ok(());
    }

    let table_path = census_table_path(&paths, &args.zip)?;
    require_file_exists(&table_path)?;
    let census = read_table(&table_path)?;

    let matrix = {
        let census = &census;
        build_matrix(&paths.grid_matrix, "grid", cli.verbose, || {
            grid_sources_from(census, cli.verbose)
        })?
    };

    let (cells, coverage) = aggregate_population(&census, &matrix)?;
    if let Some(parent) = paths.population_out.parent() {
        ensure_dir_exists(parent)?;
    }
    write_to_parquet(cells.clone(), &paths.population_out)?;

    println!(
        "Population: {} cells, attribute coverage {:.1}% -> {}",
        cells.height(),
        coverage * 100.0,
        paths.population_out.display()
    );
    Ok(())
}

pub fn internet(cli: &Cli) -> Result<()> {
    let paths = load_paths(cli)?;
    if paths.internet_out.exists() {
        println!("Internet table already exists: {}", paths.internet_out.display());
        return Ok(());
    }

    let matrix = build_matrix(&paths.quadkey_matrix, "quadkey", cli.verbose, || {
        quadkey_sources(&paths.internet_dir, cli.verbose)
    })?;

    let table = build_internet_table(&paths.internet_dir, &matrix, cli.verbose)?;
    if let Some(parent) = paths.internet_out.parent() {
        ensure_dir_exists(parent)?;
    }
    write_to_parquet(table.clone(), &paths.internet_out)?;

    println!(
        "Internet: {} cells, {} columns -> {}",
        table.height(),
        table.width(),
        paths.internet_out.display()
    );
    Ok(())
}

pub fn health(cli: &Cli) -> Result<()> {
    let paths = load_paths(cli)?;
    if paths.health_out.exists() {
        println!("Health table already exists: {}", paths.health_out.display());
        return Ok(());
    }

    require_file_exists(&paths.health_samples)?;
    let samples = read_from_parquet(&paths.health_samples)?;
    let (cells, stats) = aggregate_health(&samples)?;

    if let Some(parent) = paths.health_out.parent() {
        ensure_dir_exists(parent)?;
    }
    write_to_parquet(cells.clone(), &paths.health_out)?;

    println!(
        "Health: {} cells from {} samples ({} skipped) -> {}",
        cells.height(),
        stats.samples,
        stats.skipped,
        paths.health_out.display()
    );
    Ok(())
}

pub fn fuse(cli: &Cli) -> Result<()> {
    let paths = load_paths(cli)?;

    require_file_exists(&paths.population_out)
        .context("Population stage has not produced its table yet")?;
    require_file_exists(&paths.health_out).context("Health stage has not produced its table yet")?;
    require_file_exists(&paths.internet_out)
        .context("Internet stage has not produced its table yet")?;

    let population = read_from_parquet(&paths.population_out)?;
    let health = read_from_parquet(&paths.health_out)?;
    let internet = read_from_parquet(&paths.internet_out)?;

    let fused = crate::pipeline::fuse::fuse(&population, &health, &internet)?;
    if let Some(parent) = paths.fused_out.parent() {
        ensure_dir_exists(parent)?;
    }
    write_to_parquet(fused.clone(), &paths.fused_out)?;

    println!(
        "Fused dataset: {} cells, {} columns -> {}",
        fused.height(),
        fused.width(),
        paths.fused_out.display()
    );
    Ok(())
}

pub fn pipeline(cli: &Cli, args: &PopulationArgs) -> Result<()> {
    population(cli, args)?;
    internet(cli)?;
    health(cli)?;
    fuse(cli)
}
