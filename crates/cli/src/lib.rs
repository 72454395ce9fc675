use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use herbivory_core::{EditorConfig, EditorEvent, EditorSession, Mode, Point, ScaleValue};
use herbivory_host::{Host, HostClient};
use serde::Serialize;
use serde_json::{json, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Parser)]
#[command(name = "herbivory-cli")]
#[command(about = "Herbivory Counter CLI")]
pub struct Cli {
    /// Editor configuration file (JSON). Defaults to the platform config location.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open an image folder and print its images as JSON.
    Open {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,
    },
    /// List the tables of the folder's store.
    Tables {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,
    },
    /// Draw a scale line on an image and confirm its real-world length.
    Calibrate {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,
        #[arg(long)]
        image: i64,
        #[arg(long, value_parser = parse_point, value_name = "X,Y")]
        from: Point,
        #[arg(long, value_parser = parse_point, value_name = "X,Y")]
        to: Point,
        #[arg(long)]
        cm: f64,
    },
    /// Outline a new leaf by clicking the given points, then closing the polygon.
    Trace {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,
        #[arg(long)]
        image: i64,
        #[arg(long = "point", value_parser = parse_point, value_name = "X,Y", required = true)]
        points: Vec<Point>,
    },
    /// Print the sampling grid of a leaf.
    Grid {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,
        #[arg(long)]
        image: i64,
        #[arg(long)]
        leaf: Option<String>,
        #[arg(long = "grid-mm")]
        grid_mm: Option<f64>,
    },
    /// Record the damage category of one grid cell, credited to the configured researcher.
    Classify {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,
        #[arg(long)]
        image: i64,
        #[arg(long)]
        leaf: Option<String>,
        #[arg(long = "grid-mm")]
        grid_mm: Option<f64>,
        #[arg(long)]
        row: u32,
        #[arg(long)]
        col: u32,
        #[arg(long, value_parser = ["absent", "present", "unsure"])]
        category: String,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TraceOutput {
    leaf_id: String,
    polygon_id: Option<i64>,
    vertex_count: usize,
    area_px: f64,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Open { folder } => {
            let (_, opened) = open_host(&folder)?;
            print_json(&opened)
        }
        Commands::Tables { folder } => run_tables(&folder),
        Commands::Calibrate { folder, image, from, to, cm } => {
            let config = load_config(cli.config.as_deref())?;
            let value = run_calibrate(&folder, image, from, to, cm, config)?;
            print_json(&value)
        }
        Commands::Trace { folder, image, points } => {
            let config = load_config(cli.config.as_deref())?;
            run_trace(&folder, image, &points, config)
        }
        Commands::Grid { folder, image, leaf, grid_mm } => {
            let config = load_config(cli.config.as_deref())?;
            run_grid(&folder, image, leaf.as_deref(), grid_mm, config)
        }
        Commands::Classify { folder, image, leaf, grid_mm, row, col, category } => {
            let config = load_config(cli.config.as_deref())?;
            let target = CellTarget { leaf: leaf.as_deref(), grid_mm, row, col };
            run_classify(&folder, image, target, &category, config)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    match path {
        Some(path) => EditorConfig::load_from(path)
            .with_context(|| format!("failed to read config {}", path.display())),
        None => EditorConfig::load().context("failed to load editor configuration"),
    }
}

fn open_host(folder: &Path) -> Result<(Arc<Mutex<Host>>, Value)> {
    let host = Host::new().shared();
    let opened = invoke(&host, "folder:open", json!([folder]))?;
    Ok((host, opened))
}

/// Invoke a host procedure, turning a failed answer into an error
fn invoke(host: &Arc<Mutex<Host>>, procedure: &str, args: Value) -> Result<Value> {
    let answer = host
        .lock()
        .map_err(|_| anyhow::anyhow!("host lock poisoned"))?
        .invoke(procedure, args);

    if answer["success"] == Value::Bool(false) {
        let message = answer["error"].as_str().unwrap_or("unknown error");
        anyhow::bail!("{procedure} failed: {message}");
    }
    Ok(answer)
}

fn open_session(
    folder: &Path,
    image: i64,
    config: EditorConfig,
) -> Result<EditorSession<HostClient>> {
    let (host, _) = open_host(folder)?;
    EditorSession::open(image, HostClient::new(host), config)
        .with_context(|| format!("failed to open image {image}"))
}

fn run_tables(folder: &Path) -> Result<()> {
    let (host, _) = open_host(folder)?;
    let answer = invoke(&host, "database:getTables", json!([]))?;
    for table in answer["tables"].as_array().into_iter().flatten() {
        if let Some(name) = table.as_str() {
            println!("{name}");
        }
    }
    Ok(())
}

fn run_calibrate(
    folder: &Path,
    image: i64,
    from: Point,
    to: Point,
    cm: f64,
    config: EditorConfig,
) -> Result<ScaleValue> {
    let mut session = open_session(folder, image, config)?;
    session.set_mode(Mode::Scale);
    session.pointer_down(from);
    session.pointer_move(to);
    session.pointer_up(to);

    if !session.scale_line().is_some_and(|line| line.is_complete) {
        anyhow::bail!(
            "scale line is too short: endpoints must be more than {}px apart",
            session.config().min_line_length
        );
    }

    let value = session.confirm_scale(cm).context("invalid scale length")?;
    ensure_persisted(session.take_events())?;
    session.close();
    Ok(value)
}

fn run_trace(folder: &Path, image: i64, points: &[Point], config: EditorConfig) -> Result<()> {
    if points.len() < 3 {
        anyhow::bail!("a leaf outline needs at least 3 points, got {}", points.len());
    }

    let mut session = open_session(folder, image, config)?;
    session.set_mode(Mode::Polygon);
    if session.polygon().is_closed() {
        session.new_leaf()?;
    }

    for point in points {
        session.click(*point);
    }
    session.click(points[0]);

    if !session.polygon().is_closed() {
        anyhow::bail!(
            "outline did not close: points must be distinct and not overlap existing vertices"
        );
    }
    ensure_persisted(session.take_events())?;

    let output = TraceOutput {
        leaf_id: session.active_leaf().to_string(),
        polygon_id: session.active_polygon_id(),
        vertex_count: session.polygon().vertices().len(),
        area_px: herbivory_core::polygon_area(session.polygon().vertices()),
    };
    session.close();
    print_json(&output)
}

fn run_grid(
    folder: &Path,
    image: i64,
    leaf: Option<&str>,
    grid_mm: Option<f64>,
    config: EditorConfig,
) -> Result<()> {
    let mut session = open_session(folder, image, config)?;
    if let Some(label) = leaf {
        session.select_leaf(label)?;
    }
    if let Some(mm) = grid_mm {
        session.set_grid_size_mm(mm)?;
    }
    if session.scale().is_none() {
        log::warn!("image {} has no calibration, grid is hidden", image);
    }

    let summary = session.grid().summary();
    let output = json!({
        "leafId": session.active_leaf(),
        "grid": summary,
    });
    session.close();
    print_json(&output)
}

struct CellTarget<'a> {
    leaf: Option<&'a str>,
    grid_mm: Option<f64>,
    row: u32,
    col: u32,
}

fn run_classify(
    folder: &Path,
    image: i64,
    target: CellTarget<'_>,
    category: &str,
    config: EditorConfig,
) -> Result<()> {
    let researcher = config.researcher.clone().context(
        "no researcher configured: set HERBIVORY_RESEARCHER or \"researcher\" in the config file",
    )?;

    let mut session = open_session(folder, image, config)?;
    if let Some(label) = target.leaf {
        session.select_leaf(label)?;
    }
    if let Some(mm) = target.grid_mm {
        session.set_grid_size_mm(mm)?;
    }

    let (row, col) = (target.row, target.col);
    let leaf_id = session.active_leaf().to_string();
    if !session.grid().cells.iter().any(|cell| cell.row == row && cell.col == col) {
        anyhow::bail!("cell ({row}, {col}) is not on the grid of leaf {leaf_id}");
    }
    let polygon_id = session
        .active_polygon_id()
        .with_context(|| format!("leaf {leaf_id} has no saved outline"))?;

    let host = session.adapter().host().clone();
    session.close();
    let answer = invoke(&host, "cell:upsert", json!([polygon_id, row, col, category, researcher]))?;

    print_json(&json!({
        "leafId": leaf_id,
        "polygonId": polygon_id,
        "cellId": answer["cellId"],
        "row": row,
        "col": col,
        "category": category,
        "researcher": researcher,
    }))
}

fn ensure_persisted(events: Vec<EditorEvent>) -> Result<()> {
    for event in events {
        if let EditorEvent::PersistenceFailed { operation, message } = event {
            anyhow::bail!("{operation} failed: {message}");
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("expected X,Y but got {s:?}"))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("bad x in {s:?}: {e}"))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("bad y in {s:?}: {e}"))?;
    Ok(Point::new(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points() {
        assert_eq!(parse_point("10,20.5"), Ok(Point::new(10.0, 20.5)));
        assert_eq!(parse_point(" 3 , 4 "), Ok(Point::new(3.0, 4.0)));
        assert!(parse_point("10").is_err());
        assert!(parse_point("a,b").is_err());
    }
}
