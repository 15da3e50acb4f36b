use std::fmt::Write as _;

/// Format a buffer as a hex dump with an ASCII gutter, 16 bytes per row
pub fn format(input: &[u8]) -> String {
    let mut out = String::new();
    let mut ascii = [b' '; 16];
    let rows = input.len().div_ceil(16);
    for i in 0..rows * 16 {
        if i % 16 == 0 {
            let _ = write!(out, "{i:4}");
        }
        if i % 8 == 0 {
            out.push(' ');
        }
        match input.get(i) {
            Some(b) => {
                let _ = write!(out, " {b:02X}");
                ascii[i % 16] = if (32..=126).contains(b) { *b } else { b'.' };
            }
            None => {
                out.push_str("   ");
                ascii[i % 16] = b' ';
            }
        }
        if i % 16 == 15 {
            let _ = writeln!(out, "  {}", String::from_utf8_lossy(&ascii));
        }
    }
    out
}
