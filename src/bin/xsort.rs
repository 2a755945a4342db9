//! A thin demo CLI around the library: sorts lines of text files the way
//! `fsort` does, but through `xmsort::sort` instead of an in-process
//! `Vec<String>::sort`. Not meant to cover `fsort`'s full flag surface —
//! just enough (`-r`, `-u`, `-n`, `-o`, `-T`, `--parallel`, `-S`, `-z`) to
//! exercise every knob `Config` exposes.

use std::cmp::Ordering;
use std::fs;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::process;
use std::sync::{Arc, Mutex};

use clap::Parser;

use xmsort::adapter::SortAdapter;
use xmsort::config::Config;
use xmsort::error::SortResult;
use xmsort::stream::{MemStream, Stream};

/// `sort` takes its output stream by value (`Box<dyn Stream>`), so the
/// CLI needs a handle to the bytes that survives past the call; a plain
/// `Cursor<Vec<u8>>` can't be both moved in and read back afterwards.
#[derive(Clone)]
struct SharedBuf(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedBuf {
    fn new() -> Self {
        SharedBuf(Arc::new(Mutex::new(Cursor::new(Vec::new()))))
    }

    fn into_bytes(self) -> Vec<u8> {
        Arc::try_unwrap(self.0)
            .expect("sort() drops its output bucket before returning")
            .into_inner()
            .unwrap()
            .into_inner()
    }
}

impl Read for SharedBuf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().unwrap().read(buf)
    }
}
impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}
impl Seek for SharedBuf {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.lock().unwrap().seek(pos)
    }
}

#[derive(Parser)]
#[command(name = "xsort", about = "Sort lines of text files with a bounded memory budget")]
struct Cli {
    /// Reverse the result of comparisons
    #[arg(short = 'r', long = "reverse")]
    reverse: bool,

    /// Compare according to string numerical value
    #[arg(short = 'n', long = "numeric-sort")]
    numeric: bool,

    /// Output only the first of an equal run
    #[arg(short = 'u', long = "unique")]
    unique: bool,

    /// Line delimiter is NUL, not newline
    #[arg(short = 'z', long = "zero-terminated")]
    zero_terminated: bool,

    /// Write result to FILE instead of standard output
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<String>,

    /// Use DIR for temporaries, not $TMPDIR or /tmp
    #[arg(short = 'T', long = "temporary-directory", value_name = "DIR")]
    temp_dir: Option<String>,

    /// Number of worker-pool threads for in-memory array sort
    #[arg(long = "parallel", value_name = "N")]
    parallel: Option<usize>,

    /// Sort buffer size in bytes
    #[arg(short = 'S', long = "buffer-size", value_name = "BYTES")]
    buffer_size: Option<usize>,

    /// Emit stage/pass tracing on stderr via RUST_LOG=debug
    #[arg(long = "trace")]
    trace: bool,

    /// Files to sort; reads standard input when empty
    files: Vec<String>,
}

/// Whole lines (including the trailing delimiter's absence) are the key;
/// there is no separate data tail. `-n`/`-r` are expressed by overriding
/// `compare` rather than by a different `K`, per the adapter's own
/// guidance for orderings plain `Ord` can't express (numeric parsing,
/// reversal) without one more newtype per flag combination.
struct LineAdapter {
    delimiter: u8,
    reverse: bool,
    numeric: bool,
    unique: bool,
}

impl LineAdapter {
    fn numeric_key(line: &[u8]) -> f64 {
        std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }
}

impl SortAdapter<Vec<u8>> for LineAdapter {
    fn compare(&self, a: &Vec<u8>, b: &Vec<u8>) -> Ordering {
        let ord = if self.numeric {
            Self::numeric_key(a)
                .partial_cmp(&Self::numeric_key(b))
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cmp(b))
        } else {
            a.cmp(b)
        };
        if self.reverse { ord.reverse() } else { ord }
    }

    fn read_key(&self, src: &mut dyn Stream) -> SortResult<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match src.read(&mut byte)? {
                0 => return Ok(if line.is_empty() { None } else { Some(line) }),
                _ if byte[0] == self.delimiter => return Ok(Some(line)),
                _ => line.push(byte[0]),
            }
        }
    }

    fn write_record(&self, _src: &mut dyn Stream, dst: &mut dyn Stream, key: &Vec<u8>) -> SortResult<()> {
        dst.write_all(key)?;
        dst.write_all(&[self.delimiter])?;
        Ok(())
    }

    fn fetch_record(&self, _src: &mut dyn Stream, _key: &Vec<u8>, _limit: usize) -> SortResult<Option<Vec<u8>>> {
        Ok(Some(Vec::new()))
    }

    fn store_record(&self, dst: &mut dyn Stream, key: &Vec<u8>, _tail: &[u8]) -> SortResult<()> {
        dst.write_all(key)?;
        dst.write_all(&[self.delimiter])?;
        Ok(())
    }

    fn unify(&self) -> bool {
        self.unique
    }

    fn merge(&self, a: (&Vec<u8>, &[u8]), _b: (&Vec<u8>, &[u8])) -> Option<(Vec<u8>, Vec<u8>)> {
        Some((a.0.clone(), Vec::new()))
    }

    // Byte-lexicographic order only; `-n`/`-r` change the comparator away
    // from plain `Vec<u8>::cmp`, so the hash can no longer be trusted to
    // agree with it and radix-split/radix-sort must be skipped entirely.
    fn hash(&self, key: &Vec<u8>) -> Option<u64> {
        if self.reverse || self.numeric {
            return None;
        }
        let mut buf = [0u8; 8];
        let n = key.len().min(8);
        buf[..n].copy_from_slice(&key[..n]);
        Some(u64::from_be_bytes(buf))
    }

    fn hash_bits(&self) -> u32 {
        if self.reverse || self.numeric { 0 } else { 64 }
    }
}

fn read_all_input(files: &[String]) -> io::Result<Vec<u8>> {
    if files.is_empty() {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        return Ok(buf);
    }
    let mut buf = Vec::new();
    for path in files {
        if path == "-" {
            io::stdin().read_to_end(&mut buf)?;
        } else {
            buf.extend(fs::read(path)?);
        }
    }
    Ok(buf)
}

fn main() {
    let cli = Cli::parse();
    if cli.trace {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    }

    let adapter = LineAdapter {
        delimiter: if cli.zero_terminated { 0 } else { b'\n' },
        reverse: cli.reverse,
        numeric: cli.numeric,
        unique: cli.unique,
    };

    let input_bytes = read_all_input(&cli.files).unwrap_or_else(|e| {
        eprintln!("xsort: {e}");
        process::exit(2);
    });

    let mut builder = Config::builder();
    if let Some(n) = cli.parallel {
        builder = builder.worker_threads(n);
    }
    if let Some(bytes) = cli.buffer_size {
        builder = builder.sort_buffer_bytes(bytes);
    }
    if let Some(dir) = &cli.temp_dir {
        builder = builder.temp_dir(dir.clone());
    }
    if cli.trace {
        builder = builder.trace_level(1);
    }
    let cfg = builder.build().unwrap_or_else(|e| {
        eprintln!("xsort: invalid configuration: {e}");
        process::exit(2);
    });

    let input: Box<dyn Stream> = Box::new(MemStream::new(input_bytes));
    let output = SharedBuf::new();

    let hash_bits_hint = adapter.hash_bits();
    if let Err(e) = xmsort::sort(&adapter, input, Box::new(output.clone()), hash_bits_hint, &cfg) {
        eprintln!("xsort: {e}");
        process::exit(1);
    }

    let bytes = output.into_bytes();
    let result = match &cli.output {
        Some(path) => fs::write(path, &bytes),
        None => io::stdout().write_all(&bytes),
    };
    if let Err(e) = result {
        eprintln!("xsort: {e}");
        process::exit(1);
    }
}
