//! JTL-style per-sample CSV records.
//!
//! Column order is fixed and consumed by external dashboards; see
//! [`JTL_HEADER`]. Fields containing a comma, quote or newline are quoted
//! with doubled inner quotes.

use std::io::{BufRead, Write};

use livegate_core::Sample;

use crate::error::{ExportError, ExportResult};

/// Header line for sample files, without the trailing newline.
pub const JTL_HEADER: &str = "timeStamp,elapsed,label,responseCode,responseMessage,threadName,dataType,success,failureMessage,bytes,sentBytes,grpThreads,allThreads,URL,Latency,IdleTime,Connect";

const COLUMNS: usize = 17;

/// Encode one sample as a CSV line, without the trailing newline.
pub fn encode_sample(sample: &Sample) -> String {
    let fields: [String; COLUMNS] = [
        sample.timestamp_ms.to_string(),
        sample.elapsed_ms.to_string(),
        quote(&sample.label),
        quote(&sample.response_code),
        quote(&sample.response_message),
        quote(&sample.thread_name),
        quote(&sample.data_type),
        sample.success.to_string(),
        quote(&sample.failure_message),
        sample.bytes.to_string(),
        sample.sent_bytes.to_string(),
        sample.grp_threads.to_string(),
        sample.all_threads.to_string(),
        quote(&sample.url),
        sample.latency_ms.to_string(),
        sample.idle_time_ms.to_string(),
        sample.connect_ms.to_string(),
    ];
    fields.join(",")
}

/// Parse one CSV line produced by [`encode_sample`].
pub fn parse_sample(line: &str, line_no: usize) -> ExportResult<Sample> {
    let fields = split_fields(line).ok_or_else(|| ExportError::Record {
        line: line_no,
        reason: "unterminated quoted field".to_string(),
    })?;
    if fields.len() != COLUMNS {
        return Err(ExportError::Record {
            line: line_no,
            reason: format!("expected {COLUMNS} columns, found {}", fields.len()),
        });
    }

    let int = |idx: usize, name: &str| -> ExportResult<i64> {
        let raw = fields[idx].trim();
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse().map_err(|_| ExportError::Record {
            line: line_no,
            reason: format!("{name} is not an integer: '{raw}'"),
        })
    };
    let count = |idx: usize, name: &str| -> ExportResult<u32> {
        let v = int(idx, name)?;
        u32::try_from(v.max(0)).map_err(|_| ExportError::Record {
            line: line_no,
            reason: format!("{name} out of range: {v}"),
        })
    };

    let success = match fields[7].trim() {
        "true" | "TRUE" | "True" => true,
        "false" | "FALSE" | "False" => false,
        other => {
            return Err(ExportError::Record {
                line: line_no,
                reason: format!("success is not a boolean: '{other}'"),
            });
        }
    };

    Ok(Sample {
        timestamp_ms: int(0, "timeStamp")?,
        elapsed_ms: int(1, "elapsed")?,
        label: fields[2].clone(),
        response_code: fields[3].clone(),
        response_message: fields[4].clone(),
        thread_name: fields[5].clone(),
        data_type: fields[6].clone(),
        success,
        failure_message: fields[8].clone(),
        bytes: int(9, "bytes")?,
        sent_bytes: int(10, "sentBytes")?,
        grp_threads: count(11, "grpThreads")?,
        all_threads: count(12, "allThreads")?,
        url: fields[13].clone(),
        latency_ms: int(14, "Latency")?,
        idle_time_ms: int(15, "IdleTime")?,
        connect_ms: int(16, "Connect")?,
    })
}

/// Writes a header followed by one line per sample.
pub struct JtlWriter<W: Write> {
    out: W,
    header_written: bool,
}

impl<W: Write> JtlWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
        }
    }

    pub fn write_sample(&mut self, sample: &Sample) -> ExportResult<()> {
        if !self.header_written {
            writeln!(self.out, "{JTL_HEADER}")?;
            self.header_written = true;
        }
        writeln!(self.out, "{}", encode_sample(sample))?;
        Ok(())
    }

    pub fn flush(&mut self) -> ExportResult<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Read every sample from a JTL stream.
///
/// The header line is optional. Blank lines are skipped. A quoted field
/// may span lines.
pub fn read_samples<R: BufRead>(input: R) -> ExportResult<Vec<Sample>> {
    let mut samples = Vec::new();
    let mut pending = String::new();
    let mut start_line = 0;

    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if pending.is_empty() {
            if line.trim().is_empty() || (line_no == 1 && line.starts_with("timeStamp,")) {
                continue;
            }
            start_line = line_no;
            pending = line;
        } else {
            pending.push('\n');
            pending.push_str(&line);
        }

        if split_fields(&pending).is_some() {
            samples.push(parse_sample(&pending, start_line)?);
            pending.clear();
        }
    }

    if !pending.is_empty() {
        return Err(ExportError::Record {
            line: start_line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    Ok(samples)
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split a CSV line. `None` if a quoted field is left open.
fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::with_capacity(COLUMNS);
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            (c, _) => current.push(c),
        }
    }
    if in_quotes {
        return None;
    }
    fields.push(current);
    Some(fields)
}
