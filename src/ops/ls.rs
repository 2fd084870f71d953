//! `ls [-r] PATH...`: list files. Unreadable entries become errors in the stream and the
//! listing continues.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::env::Environment;
use crate::error::{Error, OpResult};
use crate::pipeline::{Downstream, Op, OpSpec};
use crate::types::Value;

#[derive(Clone, Debug, Default)]
pub struct Ls {
    paths: Vec<String>,
    recursive: bool,
    roots: Vec<PathBuf>,
}

impl Ls {
    pub fn new(paths: Vec<String>) -> Self {
        Ls {
            paths,
            ..Default::default()
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    fn path_value(path: &Path) -> Value {
        Value::Str(path.to_string_lossy().into_owned())
    }

    fn list_root(
        &self,
        root: &Path,
        env: &mut Environment,
        out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        if root.is_file() {
            return out.send(env, Self::path_value(root));
        }
        let mut walk = WalkDir::new(root).min_depth(1).sort_by_file_name();
        if !self.recursive {
            walk = walk.max_depth(1);
        }
        for entry in walk {
            match entry {
                Ok(entry) => out.send(env, Self::path_value(entry.path()))?,
                Err(err) => {
                    let at = err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    out.send_error(env, Error::new(err.to_string()).with_input(at))?;
                }
            }
        }
        Ok(())
    }
}

impl Op for Ls {
    fn name(&self) -> &'static str {
        "ls"
    }

    fn setup(&mut self, env: &mut Environment) -> OpResult<()> {
        let base = env.current_dir().to_path_buf();
        self.roots = if self.paths.is_empty() {
            vec![base]
        } else {
            self.paths.iter().map(|p| base.join(p)).collect()
        };
        Ok(())
    }

    fn run(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        let roots = self.roots.clone();
        for root in &roots {
            self.list_root(root, env, out)?;
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(Ls::new(self.paths.clone()).recursive(self.recursive))
    }

    fn must_be_first_in_pipeline(&self) -> bool {
        true
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Ls {
            paths: self.paths.clone(),
            recursive: self.recursive,
        })
    }
}
