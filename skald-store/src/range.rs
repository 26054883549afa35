/// Resolve an inclusive, Redis-style `[start, stop]` rank range against a
/// collection of `len` items. Negative indexes count from the end (-1 is the
/// last item). Returns `(offset, count)` for a SQL `LIMIT/OFFSET`, or `None`
/// when the range selects nothing.
pub(crate) fn resolve(len: i64, start: i64, stop: i64) -> Option<(i64, i64)> {
  let start = if start < 0 { (start + len).max(0) } else { start };
  let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };

  if len == 0 || start > stop || start >= len {
    return None;
  }

  Some((start, stop - start + 1))
}
