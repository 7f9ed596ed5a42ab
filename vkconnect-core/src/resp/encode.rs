use bytes::{BufMut, BytesMut};

/// Builds a RESP3 request out of bulk-string arguments.
///
/// Requests are always encoded as an array of bulk strings, per spec §4.2 —
/// this mirrors the one wire shape every command takes, regardless of the
/// shape of its reply. `CommandEncoder` is meant to be reused across many
/// commands on the same connection; call [`CommandEncoder::clear`] between
/// commands instead of allocating a fresh one.
#[derive(Debug, Default)]
pub struct CommandEncoder {
    buf: BytesMut,
    args: Vec<(usize, usize)>,
}

impl CommandEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one bulk-string argument, built from an arbitrary byte slice.
    pub fn arg(&mut self, arg: impl AsRef<[u8]>) -> &mut Self {
        let arg = arg.as_ref();
        let start = self.buf.len();
        self.buf.put_slice(arg);
        self.args.push((start, arg.len()));
        self
    }

    /// Appends one bulk-string argument rendered from an integer.
    pub fn arg_i64(&mut self, n: i64) -> &mut Self {
        self.arg(n.to_string())
    }

    /// Appends one bulk-string argument rendered from a float.
    pub fn arg_f64(&mut self, f: f64) -> &mut Self {
        self.arg(f.to_string())
    }

    /// Appends a fixed token (e.g. a command name) followed by one argument,
    /// a common pattern for options like `EX seconds`.
    pub fn token_with_arg(&mut self, token: &str, arg: impl AsRef<[u8]>) -> &mut Self {
        self.arg(token);
        self.arg(arg)
    }

    /// Spec §4.2's "pure token": emits `token` as a single bulk string iff
    /// `present` is true, e.g. a bare flag like `NX` or `WITHSCORES` that
    /// either appears once or not at all.
    pub fn pure_token(&mut self, token: &str, present: bool) -> &mut Self {
        if present {
            self.arg(token);
        }
        self
    }

    /// Spec §4.2's conditional "with token": runs `render` to stage
    /// whatever arguments `VALUE` contributes, then retroactively prefixes
    /// `token` ahead of them — but only if `render` actually staged at
    /// least one argument. An optional clause that renders nothing emits
    /// neither the token nor any of its would-be arguments.
    pub fn with_token(&mut self, token: &str, render: impl FnOnce(&mut Self)) -> &mut Self {
        let before = self.args.len();
        render(self);
        if self.args.len() > before {
            let start = self.buf.len();
            self.buf.put_slice(token.as_bytes());
            self.args.insert(before, (start, token.len()));
        }
        self
    }

    /// Appends a count-prefixed run of bulk-string arguments, e.g. for
    /// variadic commands where the server expects an explicit count ahead of
    /// a repeated group (`MSET numkeys k1 v1 k2 v2 ...`-style commands).
    pub fn args_with_count<I, A>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let items: Vec<A> = items.into_iter().collect();
        self.arg_i64(items.len() as i64);
        for item in items {
            self.arg(item);
        }
        self
    }

    /// Appends a fixed token once per item in `items`, interleaved with the
    /// item itself (e.g. `FIELDS field1 field2 ...` where each needs a
    /// repeated marker token ahead of it).
    pub fn args_with_repeated_token<I, A>(&mut self, token: &str, items: I) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        for item in items {
            self.arg(token);
            self.arg(item);
        }
        self
    }

    /// Number of arguments staged so far.
    pub fn resp_entries(&self) -> usize {
        self.args.len()
    }

    /// Renders the staged arguments as one complete RESP3 request frame:
    /// `*<n>\r\n$<len>\r\n<arg>\r\n...`.
    pub fn finish(&self) -> BytesMut {
        let mut out = BytesMut::new();
        out.put_slice(format!("*{}\r\n", self.args.len()).as_bytes());
        for &(start, len) in &self.args {
            out.put_slice(format!("${len}\r\n").as_bytes());
            out.put_slice(&self.buf[start..start + len]);
            out.put_slice(b"\r\n");
        }
        out
    }

    /// Resets the encoder for reuse, keeping the backing allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.args.clear();
    }
}

/// Encodes a full command (name + arguments) in one call; convenience
/// wrapper around [`CommandEncoder`] for the common case of a one-shot
/// request with no repeated-group structure.
pub fn encode_command<I, A>(name: &str, args: I) -> BytesMut
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let mut encoder = CommandEncoder::new();
    encoder.arg(name);
    for arg in args {
        encoder.arg(arg);
    }
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_simple_command() {
        let frame = encode_command("GET", ["foo"]);
        assert_eq!(frame.as_ref(), b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
    }

    #[test]
    fn encodes_no_arg_command() {
        let frame = encode_command::<[&str; 0], _>("PING", []);
        assert_eq!(frame.as_ref(), b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn reuses_encoder_across_commands() {
        let mut encoder = CommandEncoder::new();
        encoder.arg("SET").arg("k").arg("v");
        assert_eq!(encoder.finish().as_ref(), b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
        encoder.clear();
        encoder.arg("GET").arg("k");
        assert_eq!(encoder.finish().as_ref(), b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
    }

    #[test]
    fn counts_resp_entries() {
        let mut encoder = CommandEncoder::new();
        encoder.arg("MSET").args_with_count(["a", "1", "b", "2"]);
        // MSET + count-entry + 4 items = 6 args
        assert_eq!(encoder.resp_entries(), 6);
    }

    #[test]
    fn renders_integer_and_float_args() {
        let mut encoder = CommandEncoder::new();
        encoder.arg("INCRBY").arg("k").arg_i64(-7);
        assert_eq!(
            encoder.finish().as_ref(),
            b"*3\r\n$6\r\nINCRBY\r\n$1\r\nk\r\n$2\r\n-7\r\n"
        );
    }

    #[test]
    fn pure_token_present_emits_one_bulk_string() {
        let mut encoder = CommandEncoder::new();
        encoder.arg("SET").arg("k").arg("v").pure_token("NX", true);
        assert_eq!(
            encoder.finish().as_ref(),
            b"*4\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nNX\r\n"
        );
    }

    #[test]
    fn pure_token_absent_emits_nothing() {
        let mut encoder = CommandEncoder::new();
        encoder.arg("SET").arg("k").arg("v").pure_token("NX", false);
        assert_eq!(encoder.resp_entries(), 3);
        assert_eq!(
            encoder.finish().as_ref(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }

    #[test]
    fn with_token_emits_token_and_value_when_value_renders() {
        let mut encoder = CommandEncoder::new();
        encoder
            .arg("SET")
            .arg("k")
            .arg("v")
            .with_token("EX", |e| {
                e.arg_i64(60);
            });
        assert_eq!(
            encoder.finish().as_ref(),
            b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nEX\r\n$2\r\n60\r\n"
        );
    }

    #[test]
    fn with_token_omits_token_when_value_renders_nothing() {
        let mut encoder = CommandEncoder::new();
        encoder.arg("SET").arg("k").arg("v").with_token("EX", |_| {});
        assert_eq!(encoder.resp_entries(), 3);
        assert_eq!(
            encoder.finish().as_ref(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }
}
