use std::path::PathBuf;

use pyo3::exceptions::{PyIOError, PyKeyboardInterrupt, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::cancel::CancelToken;
use crate::config::{CleanParams, IndexParams, PipelineConfig, ResolveParams, SEP_THRESHOLD};
use crate::density;
use crate::error::NccError;
use crate::pipeline;
use crate::resolve;

fn to_py_err(err: NccError) -> PyErr {
    match err {
        NccError::Io(e) => PyIOError::new_err(e.to_string()),
        NccError::Cancelled => PyKeyboardInterrupt::new_err("resolution cancelled"),
        e @ (NccError::Parse { .. } | NccError::Config { .. } | NccError::TooManyContacts { .. }) => {
            PyValueError::new_err(e.to_string())
        }
        e => PyRuntimeError::new_err(e.to_string()),
    }
}

fn index_params(sep_threshold: i64, max_contacts: Option<usize>) -> IndexParams {
    IndexParams {
        sep_threshold,
        max_contacts,
    }
}

/// Returns `(resolved, removed)` group counts.
#[pyfunction]
#[pyo3(signature = (in_ncc_path, out_ncc_path, threshold=0.01, sep_threshold=SEP_THRESHOLD, homo_trans_dens_quant=90.0, max_contacts=Some(5_000_000)))]
pub fn remove_isolated_unambig(
    py: Python,
    in_ncc_path: PathBuf,
    out_ncc_path: PathBuf,
    threshold: f64,
    sep_threshold: i64,
    homo_trans_dens_quant: f64,
    max_contacts: Option<usize>,
) -> PyResult<(usize, usize)> {
    let params = CleanParams {
        threshold,
        homo_trans_dens_quant,
    };
    let report = py
        .allow_threads(|| {
            density::remove_isolated_unambig(
                &in_ncc_path,
                &out_ncc_path,
                &index_params(sep_threshold, max_contacts),
                &params,
                &CancelToken::new(),
            )
        })
        .map_err(to_py_err)?;
    Ok((report.resolved, report.removed))
}

/// Returns `(resolved, removed)` group counts.
#[pyfunction]
#[pyo3(signature = (in_ncc_path, out_ncc_path, remove_isolated=false, score_threshold=2.0, min_trans_relay=5.0, remove_pos_ambig=false, sep_threshold=SEP_THRESHOLD, max_contacts=Some(5_000_000)))]
#[allow(clippy::too_many_arguments)]
pub fn resolve_contacts(
    py: Python,
    in_ncc_path: PathBuf,
    out_ncc_path: PathBuf,
    remove_isolated: bool,
    score_threshold: f64,
    min_trans_relay: f64,
    remove_pos_ambig: bool,
    sep_threshold: i64,
    max_contacts: Option<usize>,
) -> PyResult<(usize, usize)> {
    let params = ResolveParams {
        score_threshold,
        min_trans_relay,
        remove_isolated,
        remove_pos_ambig,
    };
    let report = py
        .allow_threads(|| {
            resolve::resolve_contacts(
                &in_ncc_path,
                &out_ncc_path,
                &index_params(sep_threshold, max_contacts),
                &params,
                &CancelToken::new(),
            )
        })
        .map_err(to_py_err)?;
    Ok((report.resolved, report.removed))
}

/// Runs the default pipeline, or the one in `config_path`, and returns the
/// written paths with the final result last.
#[pyfunction]
#[pyo3(signature = (in_ncc_path, out_dir=None, config_path=None, remove_pos_ambig=false))]
pub fn run_pipeline(
    py: Python,
    in_ncc_path: PathBuf,
    out_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    remove_pos_ambig: bool,
) -> PyResult<Vec<PathBuf>> {
    let mut config = match config_path {
        Some(path) => PipelineConfig::load(&path).map_err(to_py_err)?,
        None => PipelineConfig::default(),
    };
    if remove_pos_ambig {
        if let Some(last) = config.passes.last_mut() {
            last.remove_pos_ambig = true;
        }
    }

    let report = py
        .allow_threads(|| pipeline::run_pipeline(&in_ncc_path, out_dir.as_deref(), &config, &CancelToken::new()))
        .map_err(to_py_err)?;
    Ok(report.outputs)
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(remove_isolated_unambig, m)?)?;
    m.add_function(wrap_pyfunction!(resolve_contacts, m)?)?;
    m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
    Ok(())
}
