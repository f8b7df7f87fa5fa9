//! Line-granularity text diff
//!
//! Every distinct line of the two inputs is mapped to a single `char` token, the
//! token sequences are diffed with the linear space variant of Myers' O(ND)
//! algorithm and the resulting runs are mapped back to the original lines.
//! Lines are raw bytes: content fetched from a remote host need not be UTF-8, it
//! is only decoded (lossily) when rendered.

use std::collections::HashMap;

/// Number of distinct lines a single diff can tokenize: every Unicode scalar value.
pub const MAX_DISTINCT_LINES: usize = 0x11_0000 - SURROGATE_COUNT;

const SURROGATE_START: usize = 0xD800;
const SURROGATE_COUNT: usize = 0x800;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("too many distinct lines to diff, at most {limit} are supported")]
    AlphabetExhausted { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Equal,
    Insert,
    Delete,
}

/// A maximal run of lines sharing the same edit operation.
///
/// Lines keep their original terminators so that concatenating them reproduces the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRun {
    pub op: Op,
    pub lines: Vec<Vec<u8>>,
}

/// Bijective mapping between distinct lines and single-character tokens.
#[derive(Debug)]
pub struct LineEncoder {
    index: HashMap<Vec<u8>, char>,
    lines: Vec<Vec<u8>>,
    limit: usize,
}

impl Default for LineEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn token_for(position: usize) -> Option<char> {
    let code = if position < SURROGATE_START {
        position
    } else {
        position + SURROGATE_COUNT
    };
    char::from_u32(u32::try_from(code).ok()?)
}

fn position_of(token: char) -> usize {
    let code = token as usize;
    if code < SURROGATE_START {
        code
    } else {
        code - SURROGATE_COUNT
    }
}

impl LineEncoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_DISTINCT_LINES)
    }

    /// Encoder that refuses to hand out more than `limit` tokens.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            index: HashMap::new(),
            lines: Vec::new(),
            limit: limit.min(MAX_DISTINCT_LINES),
        }
    }

    /// Number of distinct lines seen so far.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn encode(&mut self, text: &[u8]) -> Result<Vec<char>, DiffError> {
        let mut tokens = Vec::new();
        for line in text.split_inclusive(|&byte| byte == b'\n') {
            if let Some(&token) = self.index.get(line) {
                tokens.push(token);
                continue;
            }
            let position = self.lines.len();
            let token = match token_for(position) {
                Some(token) if position < self.limit => token,
                _ => return Err(DiffError::AlphabetExhausted { limit: self.limit }),
            };
            self.index.insert(line.to_vec(), token);
            self.lines.push(line.to_vec());
            tokens.push(token);
        }
        Ok(tokens)
    }

    pub fn decode(&self, tokens: &[char]) -> Vec<Vec<u8>> {
        tokens
            .iter()
            .map(|&token| self.lines[position_of(token)].clone())
            .collect()
    }
}

/// Furthest reaching x per diagonal, indexable by negative diagonals.
struct Frontier {
    offset: isize,
    x: Vec<usize>,
}

impl Frontier {
    fn new(max_d: usize) -> Self {
        Self {
            offset: max_d as isize,
            x: vec![0; 2 * max_d + 1],
        }
    }
}

impl std::ops::Index<isize> for Frontier {
    type Output = usize;

    fn index(&self, k: isize) -> &usize {
        &self.x[(k + self.offset) as usize]
    }
}

impl std::ops::IndexMut<isize> for Frontier {
    fn index_mut(&mut self, k: isize) -> &mut usize {
        &mut self.x[(k + self.offset) as usize]
    }
}

fn max_d(n: usize, m: usize) -> usize {
    (n + m).div_ceil(2) + 1
}

fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Finds a point on an optimal edit path roughly halfway between both ends.
///
/// `a` and `b` must both be non-empty. Returns the split point `(x, y)`, so the
/// path runs through `a[..x]`/`b[..y]` and then `a[x..]`/`b[y..]`.
fn middle_snake(
    a: &[char],
    b: &[char],
    fwd: &mut Frontier,
    bwd: &mut Frontier,
) -> (usize, usize) {
    let n = a.len();
    let m = b.len();
    let delta = n as isize - m as isize;
    let odd = delta & 1 == 1;
    fwd[1] = 0;
    bwd[1] = 0;
    for d in 0..max_d(n, m) as isize {
        let mut k = d;
        while k >= -d {
            let mut x = if k == -d || (k != d && fwd[k - 1] < fwd[k + 1]) {
                fwd[k + 1]
            } else {
                fwd[k - 1] + 1
            };
            let y = (x as isize - k) as usize;
            let (x0, y0) = (x, y);
            if x < n && y < m {
                x += common_prefix(&a[x..], &b[y..]);
            }
            fwd[k] = x;
            if odd && (k - delta).abs() < d && fwd[k] + bwd[delta - k] >= n {
                return (x0, y0);
            }
            k -= 2;
        }
        let mut k = d;
        while k >= -d {
            let mut x = if k == -d || (k != d && bwd[k - 1] < bwd[k + 1]) {
                bwd[k + 1]
            } else {
                bwd[k - 1] + 1
            };
            let mut y = (x as isize - k) as usize;
            if x < n && y < m {
                let advance = common_suffix(&a[..n - x], &b[..m - y]);
                x += advance;
                y += advance;
            }
            bwd[k] = x;
            if !odd && (k - delta).abs() <= d && bwd[k] + fwd[delta - k] >= n {
                return (n - x, m - y);
            }
            k -= 2;
        }
    }
    // an optimal path always meets in the middle, this only guards the loop bound
    (n, 0)
}

/// Appends the ops turning `a` into `b` to `ops`, one op per consumed token.
fn conquer(
    a: &[char],
    b: &[char],
    fwd: &mut Frontier,
    bwd: &mut Frontier,
    ops: &mut Vec<Op>,
) {
    let prefix = common_prefix(a, b);
    ops.extend(std::iter::repeat_n(Op::Equal, prefix));
    let (a, b) = (&a[prefix..], &b[prefix..]);
    let suffix = common_suffix(a, b);
    let (a, b) = (&a[..a.len() - suffix], &b[..b.len() - suffix]);
    if a.is_empty() || b.is_empty() {
        ops.extend(std::iter::repeat_n(Op::Delete, a.len()));
        ops.extend(std::iter::repeat_n(Op::Insert, b.len()));
    } else {
        let (x, y) = middle_snake(a, b, fwd, bwd);
        conquer(&a[..x], &b[..y], fwd, bwd, ops);
        conquer(&a[x..], &b[y..], fwd, bwd, ops);
    }
    ops.extend(std::iter::repeat_n(Op::Equal, suffix));
}

/// Myers' shortest edit script in linear space.
fn shortest_edit(a: &[char], b: &[char]) -> Vec<Op> {
    let max_d = max_d(a.len(), b.len());
    let mut fwd = Frontier::new(max_d);
    let mut bwd = Frontier::new(max_d);
    let mut ops = Vec::with_capacity(a.len() + b.len());
    conquer(a, b, &mut fwd, &mut bwd, &mut ops);
    ops
}

fn push_run(runs: &mut Vec<LineRun>, op: Op, lines: Vec<Vec<u8>>) {
    if lines.is_empty() {
        return;
    }
    match runs.last_mut() {
        Some(last) if last.op == op => last.lines.extend(lines),
        _ => runs.push(LineRun { op, lines }),
    }
}

/// Groups per-token ops into runs; inside each changed region deletions come before insertions.
fn collect_runs(ops: &[Op], old: &[Vec<u8>], new: &[Vec<u8>]) -> Vec<LineRun> {
    let mut runs = Vec::new();
    let (mut i, mut j) = (0, 0);
    let mut deleted = Vec::new();
    let mut inserted = Vec::new();
    for op in ops {
        match op {
            Op::Equal => {
                push_run(&mut runs, Op::Delete, std::mem::take(&mut deleted));
                push_run(&mut runs, Op::Insert, std::mem::take(&mut inserted));
                push_run(&mut runs, Op::Equal, vec![old[i].clone()]);
                i += 1;
                j += 1;
            }
            Op::Delete => {
                deleted.push(old[i].clone());
                i += 1;
            }
            Op::Insert => {
                inserted.push(new[j].clone());
                j += 1;
            }
        }
    }
    push_run(&mut runs, Op::Delete, deleted);
    push_run(&mut runs, Op::Insert, inserted);
    runs
}

/// Diffs two texts line by line.
pub fn diff_lines(old: &[u8], new: &[u8]) -> Result<Vec<LineRun>, DiffError> {
    let mut encoder = LineEncoder::new();
    let a = encoder.encode(old)?;
    let b = encoder.encode(new)?;
    Ok(collect_runs(
        &shortest_edit(&a, &b),
        &encoder.decode(&a),
        &encoder.decode(&b),
    ))
}

/// Formats deleted lines with `> ` and inserted lines with `< `; equal lines are omitted.
pub fn render(runs: &[LineRun]) -> Vec<String> {
    let mut out = Vec::new();
    for run in runs {
        let prefix = match run.op {
            Op::Equal => continue,
            Op::Delete => "> ",
            Op::Insert => "< ",
        };
        for line in &run.lines {
            let line = line.as_slice();
            let line = line.strip_suffix(b"\n").unwrap_or(line);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            out.push(format!("{prefix}{}", String::from_utf8_lossy(line)));
        }
    }
    out
}

/// Convenience wrapper: diff and render in one go.
pub fn diff(old: &[u8], new: &[u8]) -> Result<Vec<String>, DiffError> {
    Ok(render(&diff_lines(old, new)?))
}
