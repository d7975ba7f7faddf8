//! Python bindings for ferric-cuckoo using PyO3

use crate::config::FilterConfig;
use crate::cuckoo::CuckooFilter;
use crate::workload::{KeyGenerator, ProbeReport, Workload};
use crate::CuckooError;
use numpy::{IntoPyArray, PyArray1};
use pyo3::prelude::*;

fn to_py_err(e: CuckooError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string())
}

fn invalid_width(width: usize) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
        "key width must be 1, 2, 4 or 8 bytes, got {}",
        width
    ))
}

/// Python ints carry no width, so callers name it in bytes
#[derive(Debug, Clone, Copy)]
enum WideKey {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

impl WideKey {
    fn new(key: u64, width: usize) -> PyResult<Self> {
        let out_of_range = |_| {
            PyErr::new::<pyo3::exceptions::PyOverflowError, _>(format!(
                "key {} does not fit in {} bytes",
                key, width
            ))
        };
        match width {
            1 => u8::try_from(key).map(WideKey::U8).map_err(out_of_range),
            2 => u16::try_from(key).map(WideKey::U16).map_err(out_of_range),
            4 => u32::try_from(key).map(WideKey::U32).map_err(out_of_range),
            8 => Ok(WideKey::U64(key)),
            _ => Err(invalid_width(width)),
        }
    }

    fn insert(self, filter: &mut CuckooFilter) -> bool {
        match self {
            WideKey::U8(k) => filter.insert(k),
            WideKey::U16(k) => filter.insert(k),
            WideKey::U32(k) => filter.insert(k),
            WideKey::U64(k) => filter.insert(k),
        }
    }

    fn lookup(self, filter: &CuckooFilter) -> bool {
        match self {
            WideKey::U8(k) => filter.lookup(k),
            WideKey::U16(k) => filter.lookup(k),
            WideKey::U32(k) => filter.lookup(k),
            WideKey::U64(k) => filter.lookup(k),
        }
    }
}

fn summarize<K>(report: ProbeReport<K>) -> (usize, usize) {
    (report.probed, report.false_positives.len())
}

/// Python wrapper for CuckooFilter.
///
/// Keys default to 16 bits, matching the reference workload. Pass `width`
/// (in bytes) for wider keys; `34` at width 2 and at width 4 are different keys.
#[pyclass(name = "CuckooFilter")]
struct PyCuckooFilter {
    inner: CuckooFilter,
}

#[pymethods]
impl PyCuckooFilter {
    #[new]
    #[pyo3(signature = (num_buckets=128, max_relocations=8, designed_load=0.25, seed=None))]
    fn new(
        num_buckets: usize,
        max_relocations: usize,
        designed_load: f64,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        let mut config = FilterConfig::default()
            .with_num_buckets(num_buckets)
            .with_max_relocations(max_relocations)
            .with_designed_load(designed_load);
        if let Some(seed) = seed {
            config = config.with_seed(seed);
        }

        let filter = config.build().map_err(to_py_err)?;
        Ok(PyCuckooFilter { inner: filter })
    }

    #[pyo3(signature = (key, width=2))]
    fn insert(&mut self, key: u64, width: usize) -> PyResult<bool> {
        Ok(WideKey::new(key, width)?.insert(&mut self.inner))
    }

    #[pyo3(signature = (key, width=2))]
    fn lookup(&self, key: u64, width: usize) -> PyResult<bool> {
        Ok(WideKey::new(key, width)?.lookup(&self.inner))
    }

    /// Look up keys the reference workload never generates;
    /// returns (probed, false positives)
    #[pyo3(signature = (keys, width=2))]
    fn probe(&self, keys: Vec<u64>, width: usize) -> PyResult<(usize, usize)> {
        fn narrow<K: TryFrom<u64>>(keys: Vec<u64>, width: usize) -> PyResult<Vec<K>> {
            keys.into_iter()
                .map(|key| {
                    K::try_from(key).map_err(|_| {
                        PyErr::new::<pyo3::exceptions::PyOverflowError, _>(format!(
                            "key {} does not fit in {} bytes",
                            key, width
                        ))
                    })
                })
                .collect()
        }

        let workload = Workload::for_filter(&self.inner);
        let (probed, hits) = match width {
            1 => summarize(workload.probe(&self.inner, narrow::<u8>(keys, width)?)),
            2 => summarize(workload.probe(&self.inner, narrow::<u16>(keys, width)?)),
            4 => summarize(workload.probe(&self.inner, narrow::<u32>(keys, width)?)),
            8 => summarize(workload.probe(&self.inner, keys)),
            _ => return Err(invalid_width(width)),
        };
        Ok((probed, hits))
    }

    fn __contains__(&self, key: u16) -> bool {
        self.inner.lookup(key)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn __len__(&self) -> usize {
        self.inner.occupied()
    }

    fn load_factor(&self) -> f64 {
        self.inner.load_factor()
    }

    fn over_capacity(&self) -> bool {
        self.inner.capacity_advisory().is_some()
    }

    /// Raw buckets as a uint16 array
    fn snapshot<'py>(&self, py: Python<'py>) -> &'py PyArray1<u16> {
        self.inner.snapshot().into_buckets().into_pyarray(py)
    }

    fn restore(&mut self, buckets: Vec<u16>) -> PyResult<()> {
        let snapshot = crate::cuckoo::FilterSnapshot::from_buckets(buckets);
        self.inner.restore(&snapshot).map_err(to_py_err)
    }

    /// Run the reference fill/verify pass; returns (inserts, members, total)
    fn run_workload(&mut self) -> (usize, usize, usize) {
        let stats = Workload::for_filter(&self.inner).run(&mut self.inner);
        (stats.inserted, stats.members, stats.attempted)
    }

    fn stats(&self) -> String {
        self.inner.stats().to_string()
    }

    fn __str__(&self) -> String {
        format!(
            "CuckooFilter(buckets={}, occupied={}, load={:.3})",
            self.inner.num_buckets(),
            self.inner.occupied(),
            self.inner.load_factor()
        )
    }

    fn __repr__(&self) -> String {
        format!("CuckooFilter(num_buckets={})", self.inner.num_buckets())
    }
}

/// First `count` keys of the workload sequence starting after `init_key`
#[pyfunction]
#[pyo3(signature = (count, init_key=crate::workload::INIT_KEY))]
fn generate_keys(count: usize, init_key: u16) -> Vec<u16> {
    KeyGenerator::new(init_key).take(count).collect()
}

#[pyfunction]
fn fingerprint(key: u16) -> u16 {
    crate::hash::fingerprint(key)
}

/// Python module definition
#[pymodule]
fn ferric_cuckoo(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyCuckooFilter>()?;

    m.add_function(wrap_pyfunction!(generate_keys, m)?)?;
    m.add_function(wrap_pyfunction!(fingerprint, m)?)?;

    m.add("DEFAULT_NUM_BUCKETS", crate::config::DEFAULT_NUM_BUCKETS)?;
    m.add("DEFAULT_MAX_RELOCATIONS", crate::config::DEFAULT_MAX_RELOCATIONS)?;
    m.add("__version__", "0.1.0")?;

    Ok(())
}
