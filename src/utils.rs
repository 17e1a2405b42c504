use std::str::FromStr;

/// Parse `x,y,z` into a homogeneous triplet, for CLI arguments
#[allow(clippy::many_single_char_names)]
pub fn parse_triplet<T: FromStr>(s: &str) -> Result<(T, T, T), String> {
    let v = s.split(',').collect::<Vec<_>>();
    if v.len() != 3 {
        return Err(format!("expected three comma-separated values, got {s:?}"));
    }
    let parse = |s: &str| T::from_str(s).map_err(|_| format!("could not parse {s:?}"));
    Ok((parse(v[0])?, parse(v[1])?, parse(v[2])?))
}

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}

pub mod timing {

    use super::group_digits;
    use std::io::Write;
    use std::time::Instant;

    /// Coarse phase timing for the command-line tools
    pub struct Progress {
        previous: Instant,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self { Self { previous: Instant::now() } }

        /// Print message, append ellipsis, flush stdout, stay on same line, start timer.
        pub fn start(&mut self, message: &str) {
            print!("{message} ... ");
            let _ = std::io::stdout().flush();
            self.previous = Instant::now();
        }

        /// Print time elapsed since the last start
        pub fn done(&mut self) {
            println!("{} ms", group_digits(self.previous.elapsed().as_millis()));
            self.previous = Instant::now();
        }
    }
}
