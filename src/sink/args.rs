use std::collections::HashMap;
use std::str::FromStr;
use anyhow::{anyhow, Result};

/// Store options given as `key=value` pairs separated by commas.
#[derive(Debug, Default)]
pub struct Args {
    args: HashMap<String, String>,
}

impl Args {
    /// Split `kind,key=value,...` into the store kind and its options.
    pub fn parse(arg: &str) -> (&str, Self) {
        let (kind, rest) = arg.split_once(',').unwrap_or((arg, ""));
        (kind.trim(), Self::options(rest))
    }

    pub fn options(options: &str) -> Self {
        let args = options.split(',').flat_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let k = k.trim();
            match k.is_empty() {
                true  => None,
                false => Some((k.to_owned(), v.trim().to_owned())),
            }
        }).collect::<HashMap<_, _>>();

        Self { args }
    }

    pub fn get(&self, name: &str) -> Result<&str> {
        match self.args.get(name) {
            Some(value) => Ok(value.as_str()),
            None        => Err(anyhow!("missing store option '{}'", name)),
        }
    }

    pub fn opt(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    pub fn parse_opt<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.opt(name) {
            Some(value) => match value.parse() {
                Ok(value) => Ok(Some(value)),
                Err(_)    => Err(anyhow!("invalid store option {}={}", name, value)),
            },
            None => Ok(None),
        }
    }
}
