use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use itertools::Itertools;
use structopt::StructOpt;
use tempfile::TempDir;

use hicdiff::cli::{run, Hicdiff};

/// A scratch directory holding the input tables of a test case.
pub(crate) struct Testcase {
    dir: TempDir,
}

impl Testcase {
    pub(crate) fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Testcase {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub(crate) fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub(crate) fn write(&self, name: &str, lines: impl IntoIterator<Item = String>) -> PathBuf {
        let path = self.path(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    pub(crate) fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).unwrap()
    }

    /// Run the command line with the given arguments.
    pub(crate) fn run(&self, args: &[&str]) -> Result<()> {
        run(Hicdiff::from_iter(
            std::iter::once("hicdiff").chain(args.iter().cloned()),
        ))
    }
}

pub(crate) fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// Contact pairs of a homozygous inversion on chr1 (20 bins of 100bp): a
/// uniform background plus a block of strong contacts between bins 3-5 and
/// 15-17. The control only has the background.
pub(crate) fn inversion_contacts() -> (Vec<String>, Vec<String>) {
    let background = (0..20u64)
        .cartesian_product(0..20u64)
        .map(|(i, j)| format!("chr1\t{}\t{}", i * 100 + 50, j * 100 + 50))
        .collect_vec();
    let mut test = background.clone();
    for &(row, col) in &[(3, 15), (4, 16), (5, 17), (4, 15), (5, 16), (3, 16), (5, 15)] {
        for _ in 0..200 {
            test.push(format!("chr1\t{}\t{}", row * 100 + 10, col * 100 + 10));
        }
    }
    (test, background)
}
