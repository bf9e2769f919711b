//! Path expressions over dynamically typed data.
//!
//! A [Path] is parsed from expressions like `user.roles[0].name` or
//! `array[].field[]` and can then walk any [Data] tree, visiting every leaf
//! the expression reaches. Validation and parameter extraction are built on
//! top of this.
//!
//! Grammar:
//! ```text
//! path    := segment ( ('.' segment) | ('[' index? ']') )*
//! segment := name | '*'
//! index   := integer
//! ```

use crate::data::Data;
use crate::petrel_error::PathSyntaxError;
use crate::util::unwrap_some;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The kind of a single path step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
  /// Descend into a mapping by name and keep going.
  Object,
  /// Access a sequence (optionally at a fixed index) and keep going.
  Array,
  /// Terminal step holding the leaf. Never has a successor.
  Element,
}

/// A parsed path expression: a singly linked list of steps.
///
/// Invariants: [PathKind::Object] and [PathKind::Array] steps always have a
/// successor, [PathKind::Element] never does. Immutable once parsed; `Clone`
/// deep-copies the whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
  pub kind: PathKind,
  /// Step name. `Some("*")` denotes the wildcard. `None` for unnamed steps
  /// such as the elements of an array.
  pub name: Option<String>,
  /// Fixed index for [PathKind::Array] steps, `None` iterates the whole sequence.
  pub index: Option<usize>,
  pub next: Option<Box<Path>>,
}

/// Whether a visited leaf exists in the walked data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Found {
  /// The leaf exists, the context carries its value.
  Found,
  /// The direct parent of the leaf exists but the leaf itself does not.
  ElementNotFound,
  /// An ancestor on the way to the leaf is missing or has the wrong shape.
  ParentNotFound,
}

/// Everything the walker knows about one visited leaf (or miss).
#[derive(Debug)]
pub struct Context<'a> {
  /// The leaf value. `None` on misses.
  pub value: Option<&'a Data>,
  /// The container the leaf lives (or would live) in. `None` only for the
  /// root itself.
  pub parent: Option<&'a Data>,
  /// The exact path of this hit, with all indices filled in.
  pub path: Path,
  /// Leaf name. Empty when the leaf is an array element.
  pub name: String,
  /// Index within the parent sequence. `None` when the parent is a mapping.
  pub index: Option<usize>,
  pub found: Found,
  stop: bool,
}

impl Context<'_> {
  /// Stop the walk. The current visitor invocation still completes, no
  /// further contexts are emitted afterwards.
  pub fn stop(&mut self) {
    self.stop = true;
  }

  /// Owned snapshot of this context, detached from the walked data.
  pub fn to_located(&self) -> Located {
    Located {
      value: self.value.cloned(),
      path: self.path.clone(),
      name: self.name.clone(),
      index: self.index,
      found: self.found,
    }
  }
}

/// An owned walk result, see [Path::first].
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
  pub value: Option<Data>,
  pub path: Path,
  pub name: String,
  pub index: Option<usize>,
  pub found: Found,
}

// Proto segment produced by the tokeniser: a name and its bracket accesses.
struct Segment {
  name: String,
  brackets: Vec<Option<usize>>,
}

fn tokenize(expr: &str) -> Result<Vec<Segment>, PathSyntaxError> {
  if expr.starts_with('.') {
    return Err(PathSyntaxError::LeadingDot(expr.to_string()));
  }

  let mut segments = Vec::new();
  let mut rest = expr;

  loop {
    let name_end = rest.find(['.', '[']).unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.contains(']') {
      return Err(PathSyntaxError::UnmatchedBracket(expr.to_string()));
    }

    rest = &rest[name_end..];

    let mut brackets = Vec::new();
    while let Some(after_open) = rest.strip_prefix('[') {
      let close = after_open
        .find(']')
        .ok_or_else(|| PathSyntaxError::UnmatchedBracket(expr.to_string()))?;
      let content = &after_open[..close];
      if content.is_empty() {
        brackets.push(None);
      } else {
        let index = content.parse::<usize>().map_err(|_| {
          PathSyntaxError::InvalidIndex(expr.to_string(), content.to_string())
        })?;
        brackets.push(Some(index));
      }

      rest = &after_open[close + 1..];
    }

    if name.is_empty() {
      // An unnamed segment is only legal as a bracket access on the root.
      if brackets.is_empty() || !segments.is_empty() {
        return Err(PathSyntaxError::EmptyName(expr.to_string()));
      }
    }

    segments.push(Segment { name: name.to_string(), brackets });

    if rest.is_empty() {
      return Ok(segments);
    }

    match rest.strip_prefix('.') {
      Some(after_dot) => {
        if after_dot.is_empty() {
          return Err(PathSyntaxError::EmptyName(expr.to_string()));
        }
        rest = after_dot;
      }
      // Anything else directly after ']' (brackets consume their own tail).
      None => return Err(PathSyntaxError::IllegalAfterBracket(expr.to_string())),
    }
  }
}

impl Path {
  /// Parses a path expression. An empty string parses to a single
  /// [PathKind::Element] step with an empty name.
  pub fn parse(expr: impl AsRef<str>) -> Result<Path, PathSyntaxError> {
    let expr = expr.as_ref();
    if expr.is_empty() {
      return Ok(Path { kind: PathKind::Element, name: None, index: None, next: None });
    }

    let segments = tokenize(expr)?;

    // Flatten the segments into (kind, name, index) accessors.
    let mut steps: Vec<(PathKind, Option<String>, Option<usize>)> = Vec::new();
    for segment in &segments {
      let name = if segment.name.is_empty() { None } else { Some(segment.name.clone()) };
      match segment.brackets.split_first() {
        None => steps.push((PathKind::Object, name, None)),
        Some((first, more)) => {
          steps.push((PathKind::Array, name, *first));
          for index in more {
            steps.push((PathKind::Array, None, *index));
          }
        }
      }
    }

    // The final step is always Element: a trailing name access becomes the
    // Element itself, a trailing bracket access gets an unnamed Element.
    match steps.last_mut() {
      Some((kind @ PathKind::Object, _, _)) => *kind = PathKind::Element,
      _ => steps.push((PathKind::Element, None, None)),
    }

    let mut path: Option<Path> = None;
    for (kind, name, index) in steps.into_iter().rev() {
      path = Some(Path { kind, name, index, next: path.map(Box::new) });
    }

    Ok(unwrap_some(path))
  }

  /// Number of steps in the chain, including the terminal Element.
  pub fn depth(&self) -> usize {
    let mut count = 1;
    let mut current = self;
    while let Some(next) = current.next.as_deref() {
      count += 1;
      current = next;
    }
    count
  }

  /// The terminal Element step.
  pub fn tail(&self) -> &Path {
    let mut current = self;
    while let Some(next) = current.next.as_deref() {
      current = next;
    }
    current
  }

  /// The step whose access produces the parent of the leaf, i.e. the
  /// second to last step. `None` for single step paths.
  pub fn last_parent(&self) -> Option<&Path> {
    let mut current = self;
    let mut previous = None;
    while let Some(next) = current.next.as_deref() {
      previous = Some(current);
      current = next;
    }
    previous
  }

  /// True if any step in the chain is an array access.
  pub fn has_array(&self) -> bool {
    let mut current = self;
    loop {
      if current.kind == PathKind::Array {
        return true;
      }
      match current.next.as_deref() {
        Some(next) => current = next,
        None => return false,
      }
    }
  }

  /// A copy limited to the first `depth` steps, the last of which is turned
  /// into an Element. `truncate(0)` and over-long depths return a full clone.
  pub fn truncate(&self, depth: usize) -> Path {
    if depth == 0 || depth >= self.depth() {
      return self.clone();
    }

    let mut steps = Vec::with_capacity(depth);
    let mut current = self;
    for _ in 0..depth {
      steps.push((current.kind, current.name.clone(), current.index));
      if let Some(next) = current.next.as_deref() {
        current = next;
      }
    }

    if let Some(last) = steps.last_mut() {
      last.0 = PathKind::Element;
      last.2 = None;
    }

    let mut path: Option<Path> = None;
    for (kind, name, index) in steps.into_iter().rev() {
      path = Some(Path { kind, name, index, next: path.map(Box::new) });
    }
    unwrap_some(path)
  }

  /// Walks `data` depth-first, invoking `visit` on every leaf the path
  /// reaches and on every terminal failure point. At least one context is
  /// always emitted.
  pub fn walk<'a, F>(&self, data: &'a Data, mut visit: F)
  where
    F: FnMut(&mut Context<'a>),
  {
    let mut walker = Walker { visit: &mut visit, stopped: false };
    let mut trail = Vec::new();
    self.step(data, None, None, &mut trail, &mut walker);
  }

  /// Runs the walk until the first context and returns an owned snapshot
  /// of it. Totality guarantees there is one.
  pub fn first(&self, data: &Data) -> Located {
    let mut result = None;
    self.walk(data, |ctx| {
      result = Some(ctx.to_located());
      ctx.stop();
    });
    unwrap_some(result)
  }

  fn step<'a>(
    &self,
    current: &'a Data,
    parent: Option<&'a Data>,
    index: Option<usize>,
    trail: &mut Vec<(PathKind, Option<String>, Option<usize>)>,
    w: &mut Walker<'a, '_>,
  ) {
    if w.stopped {
      return;
    }

    match self.kind {
      PathKind::Element => self.step_element(current, parent, index, trail, w),
      PathKind::Object => self.step_object(current, trail, w),
      PathKind::Array => self.step_array(current, trail, w),
    }
  }

  fn step_element<'a>(
    &self,
    current: &'a Data,
    parent: Option<&'a Data>,
    index: Option<usize>,
    trail: &mut Vec<(PathKind, Option<String>, Option<usize>)>,
    w: &mut Walker<'a, '_>,
  ) {
    match self.name.as_deref() {
      // Unnamed leaf: the current value itself, reached through iteration.
      None => w.emit(Context {
        value: Some(current),
        parent,
        path: assemble(trail, None),
        name: String::new(),
        index,
        found: Found::Found,
        stop: false,
      }),
      Some("*") => match current.as_mapping() {
        Some(map) if map.is_empty() => w.emit(Context {
          value: None,
          parent: Some(current),
          path: assemble(trail, Some("*")),
          name: "*".to_string(),
          index: None,
          found: Found::ElementNotFound,
          stop: false,
        }),
        Some(map) => {
          for (key, value) in map {
            w.emit(Context {
              value: Some(value),
              parent: Some(current),
              path: assemble(trail, Some(key)),
              name: key.clone(),
              index: None,
              found: Found::Found,
              stop: false,
            });
            if w.stopped {
              return;
            }
          }
        }
        None => w.emit(Context {
          value: None,
          parent: Some(current),
          path: assemble(trail, Some("*")),
          name: "*".to_string(),
          index: None,
          found: Found::ParentNotFound,
          stop: false,
        }),
      },
      Some(name) => match current.as_mapping() {
        Some(map) => {
          let (value, found) = match map.get(name) {
            Some(value) => (Some(value), Found::Found),
            None => (None, Found::ElementNotFound),
          };
          w.emit(Context {
            value,
            parent: Some(current),
            path: assemble(trail, Some(name)),
            name: name.to_string(),
            index: None,
            found,
            stop: false,
          });
        }
        None => w.emit(Context {
          value: None,
          parent: Some(current),
          path: assemble(trail, Some(name)),
          name: name.to_string(),
          index: None,
          found: Found::ParentNotFound,
          stop: false,
        }),
      },
    }
  }

  fn step_object<'a>(
    &self,
    current: &'a Data,
    trail: &mut Vec<(PathKind, Option<String>, Option<usize>)>,
    w: &mut Walker<'a, '_>,
  ) {
    let name = unwrap_some(self.name.as_deref());
    let next = unwrap_some(self.next.as_deref());

    if name == "*" {
      match current.as_mapping() {
        Some(map) if map.is_empty() => w.emit(Context {
          value: None,
          parent: Some(current),
          path: assemble(trail, Some("*")),
          name: "*".to_string(),
          index: None,
          found: Found::ParentNotFound,
          stop: false,
        }),
        Some(map) => {
          for (key, value) in map {
            trail.push((PathKind::Object, Some(key.clone()), None));
            next.step(value, Some(current), None, trail, w);
            trail.pop();
            if w.stopped {
              return;
            }
          }
        }
        None => w.emit(Context {
          value: None,
          parent: Some(current),
          path: assemble(trail, Some("*")),
          name: "*".to_string(),
          index: None,
          found: Found::ParentNotFound,
          stop: false,
        }),
      }
      return;
    }

    match current.as_mapping() {
      Some(map) => match map.get(name) {
        Some(value) => {
          trail.push((PathKind::Object, Some(name.to_string()), None));
          next.step(value, Some(current), None, trail, w);
          trail.pop();
        }
        None => {
          let found = if next.kind == PathKind::Element {
            Found::ElementNotFound
          } else {
            Found::ParentNotFound
          };
          w.emit(Context {
            value: None,
            parent: Some(current),
            path: assemble(trail, Some(name)),
            name: name.to_string(),
            index: None,
            found,
            stop: false,
          });
        }
      },
      None => w.emit(Context {
        value: None,
        parent: Some(current),
        path: assemble(trail, Some(name)),
        name: name.to_string(),
        index: None,
        found: Found::ParentNotFound,
        stop: false,
      }),
    }
  }

  fn step_array<'a>(
    &self,
    current: &'a Data,
    trail: &mut Vec<(PathKind, Option<String>, Option<usize>)>,
    w: &mut Walker<'a, '_>,
  ) {
    let next = unwrap_some(self.next.as_deref());

    // Resolve the sequence this step operates on.
    let seq_data: &'a Data = match self.name.as_deref() {
      Some(name) => match current.as_mapping() {
        Some(map) => match map.get(name) {
          Some(value) => value,
          // The array that would hold the leaf elements is missing.
          None => {
            w.emit(Context {
              value: None,
              parent: Some(current),
              path: assemble(trail, Some(name)),
              name: name.to_string(),
              index: None,
              found: Found::ParentNotFound,
              stop: false,
            });
            return;
          }
        },
        None => {
          w.emit(Context {
            value: None,
            parent: Some(current),
            path: assemble(trail, Some(name)),
            name: name.to_string(),
            index: None,
            found: Found::ParentNotFound,
            stop: false,
          });
          return;
        }
      },
      None => current,
    };

    let Some(seq) = seq_data.as_sequence() else {
      // Named or not, a non-sequence value cannot parent array elements.
      let (path, name) = match self.name.as_deref() {
        Some(name) => (assemble(trail, Some(name)), name.to_string()),
        None => {
          trail.push((PathKind::Array, None, self.index));
          let path = assemble(trail, None);
          trail.pop();
          (path, String::new())
        }
      };
      w.emit(Context {
        value: None,
        parent: Some(current),
        path,
        name,
        index: None,
        found: Found::ParentNotFound,
        stop: false,
      });
      return;
    };

    match self.index {
      Some(index) => match seq.get(index) {
        Some(element) => {
          trail.push((PathKind::Array, self.name.clone(), Some(index)));
          next.step(element, Some(seq_data), Some(index), trail, w);
          trail.pop();
        }
        None => {
          trail.push((PathKind::Array, self.name.clone(), Some(index)));
          let path = assemble(trail, None);
          trail.pop();
          w.emit(Context {
            value: None,
            parent: Some(seq_data),
            path,
            name: String::new(),
            index: Some(index),
            found: Found::ElementNotFound,
            stop: false,
          });
        }
      },
      None => {
        if seq.is_empty() {
          let found = if next.kind == PathKind::Element {
            Found::ElementNotFound
          } else {
            Found::ParentNotFound
          };
          trail.push((PathKind::Array, self.name.clone(), None));
          let path = assemble(trail, None);
          trail.pop();
          w.emit(Context {
            value: None,
            parent: Some(seq_data),
            path,
            name: String::new(),
            index: None,
            found,
            stop: false,
          });
          return;
        }

        for (index, element) in seq.iter().enumerate() {
          trail.push((PathKind::Array, self.name.clone(), Some(index)));
          next.step(element, Some(seq_data), Some(index), trail, w);
          trail.pop();
          if w.stopped {
            return;
          }
        }
      }
    }
  }
}

struct Walker<'a, 'f> {
  visit: &'f mut dyn FnMut(&mut Context<'a>),
  stopped: bool,
}

impl<'a> Walker<'a, '_> {
  fn emit(&mut self, mut ctx: Context<'a>) {
    (self.visit)(&mut ctx);
    if ctx.stop {
      self.stopped = true;
    }
  }
}

/// Rebuilds an owned [Path] from the walked prefix plus a terminal Element
/// with the given name.
fn assemble(
  trail: &[(PathKind, Option<String>, Option<usize>)],
  leaf: Option<&str>,
) -> Path {
  let mut path = Path {
    kind: PathKind::Element,
    name: leaf.map(|l| l.to_string()),
    index: None,
    next: None,
  };

  for (kind, name, index) in trail.iter().rev() {
    path = Path { kind: *kind, name: name.clone(), index: *index, next: Some(Box::new(path)) };
  }

  path
}

impl Display for Path {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut current = Some(self);
    let mut first = true;
    while let Some(step) = current {
      match step.kind {
        PathKind::Object | PathKind::Element => {
          if let Some(name) = step.name.as_deref() {
            if !first {
              f.write_str(".")?;
            }
            f.write_str(name)?;
            first = false;
          }
        }
        PathKind::Array => {
          if let Some(name) = step.name.as_deref() {
            if !first {
              f.write_str(".")?;
            }
            f.write_str(name)?;
          }
          match step.index {
            Some(index) => write!(f, "[{}]", index)?,
            None => f.write_str("[]")?,
          }
          first = false;
        }
      }
      current = step.next.as_deref();
    }
    Ok(())
  }
}

impl FromStr for Path {
  type Err = PathSyntaxError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Path::parse(s)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::data_map;

  fn roundtrip(expr: &str) {
    let path = Path::parse(expr).unwrap();
    assert_eq!(path.to_string(), expr, "parse/print mismatch for {:?}", expr);
  }

  #[test]
  fn parse_round_trips() {
    for expr in [
      "",
      "a",
      "*",
      "a.b",
      "a.b.c",
      "a.*.b",
      "array[]",
      "array[0]",
      "array[].field",
      "array[].field[]",
      "a[0][1]",
      "[]",
      "[].b",
      "[0]",
      "deeply.nested[3].value[][]",
    ] {
      roundtrip(expr);
    }
  }

  #[test]
  fn parse_structure() {
    let path = Path::parse("array[].field[]").unwrap();
    assert_eq!(path.kind, PathKind::Array);
    assert_eq!(path.name.as_deref(), Some("array"));
    assert_eq!(path.index, None);
    let second = path.next.as_deref().unwrap();
    assert_eq!(second.kind, PathKind::Array);
    assert_eq!(second.name.as_deref(), Some("field"));
    let tail = second.next.as_deref().unwrap();
    assert_eq!(tail.kind, PathKind::Element);
    assert_eq!(tail.name, None);
    assert!(tail.next.is_none());
  }

  #[test]
  fn parse_syntax_errors() {
    assert!(matches!(Path::parse(".a"), Err(PathSyntaxError::LeadingDot(_))));
    assert!(matches!(Path::parse("a..b"), Err(PathSyntaxError::EmptyName(_))));
    assert!(matches!(Path::parse("a."), Err(PathSyntaxError::EmptyName(_))));
    assert!(matches!(Path::parse("a.[0]"), Err(PathSyntaxError::EmptyName(_))));
    assert!(matches!(Path::parse("a["), Err(PathSyntaxError::UnmatchedBracket(_))));
    assert!(matches!(Path::parse("a]b"), Err(PathSyntaxError::UnmatchedBracket(_))));
    assert!(matches!(Path::parse("a[x]"), Err(PathSyntaxError::InvalidIndex(_, _))));
    assert!(matches!(Path::parse("a[-1]"), Err(PathSyntaxError::InvalidIndex(_, _))));
    assert!(matches!(Path::parse("a[]b"), Err(PathSyntaxError::IllegalAfterBracket(_))));
  }

  #[test]
  fn programmatic_path_round_trips() {
    let path = Path {
      kind: PathKind::Object,
      name: Some("user".to_string()),
      index: None,
      next: Some(Box::new(Path {
        kind: PathKind::Element,
        name: Some("email".to_string()),
        index: None,
        next: None,
      })),
    };

    assert_eq!(Path::parse(path.to_string()).unwrap(), path);
  }

  #[test]
  fn helpers() {
    let path = Path::parse("a.b[0].c").unwrap();
    assert_eq!(path.depth(), 4);
    assert!(path.has_array());
    assert_eq!(path.tail().name.as_deref(), Some("c"));
    assert_eq!(path.last_parent().unwrap().kind, PathKind::Array);
    assert_eq!(path.truncate(2).to_string(), "a.b");
    assert!(!Path::parse("a.b").unwrap().has_array());
  }

  fn collect(expr: &str, data: &Data) -> Vec<(String, Found, Option<Data>)> {
    let mut out = Vec::new();
    Path::parse(expr).unwrap().walk(data, |ctx| {
      out.push((ctx.path.to_string(), ctx.found, ctx.value.cloned()));
    });
    out
  }

  #[test]
  fn walk_simple_lookup() {
    let data = data_map! {"a" => data_map!{"b" => "leaf"}};
    let contexts = collect("a.b", &data);
    assert_eq!(
      contexts,
      vec![("a.b".to_string(), Found::Found, Some(Data::from("leaf")))]
    );
  }

  #[test]
  fn walk_missing_leaf_and_parent() {
    let data = data_map! {"a" => data_map!{}};
    assert_eq!(collect("a.b", &data), vec![("a.b".to_string(), Found::ElementNotFound, None)]);
    // Missing ancestor of a deeper leaf.
    assert_eq!(
      collect("missing.b.c", &data),
      vec![("missing".to_string(), Found::ParentNotFound, None)]
    );
    // Scalar in place of a mapping.
    let scalar = data_map! {"a" => 1i64};
    assert_eq!(collect("a.b", &scalar), vec![("a.b".to_string(), Found::ParentNotFound, None)]);
  }

  #[test]
  fn walk_array_seed_scenario() {
    let data = data_map! {
      "array" => vec![
        data_map!{"field" => Vec::<Data>::new()},
        data_map!{"field" => vec![Data::from("a"), Data::from("b")]},
        data_map!{},
        data_map!{"field" => vec![Data::from("c")]},
      ]
    };

    let contexts = collect("array[].field[]", &data);
    assert_eq!(
      contexts,
      vec![
        ("array[0].field[]".to_string(), Found::ElementNotFound, None),
        ("array[1].field[0]".to_string(), Found::Found, Some(Data::from("a"))),
        ("array[1].field[1]".to_string(), Found::Found, Some(Data::from("b"))),
        ("array[2].field".to_string(), Found::ParentNotFound, None),
        ("array[3].field[0]".to_string(), Found::Found, Some(Data::from("c"))),
      ]
    );
  }

  #[test]
  fn walk_array_index() {
    let data = data_map! {"a" => vec![Data::from("x"), Data::from("y")]};
    assert_eq!(collect("a[1]", &data), vec![("a[1]".to_string(), Found::Found, Some(Data::from("y")))]);
    assert_eq!(collect("a[5]", &data), vec![("a[5]".to_string(), Found::ElementNotFound, None)]);
    let scalar = data_map! {"a" => "nope"};
    assert_eq!(collect("a[0]", &scalar), vec![("a".to_string(), Found::ParentNotFound, None)]);
  }

  #[test]
  fn walk_wildcard() {
    let data = data_map! {"a" => data_map!{"x" => 1i64, "y" => 2i64}};
    let mut contexts = collect("a.*", &data);
    contexts.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
      contexts,
      vec![
        ("a.x".to_string(), Found::Found, Some(Data::from(1i64))),
        ("a.y".to_string(), Found::Found, Some(Data::from(2i64))),
      ]
    );

    let empty = data_map! {"a" => data_map!{}};
    assert_eq!(collect("a.*", &empty), vec![("a.*".to_string(), Found::ElementNotFound, None)]);
    // Wildcard that is not the last step over an empty mapping.
    assert_eq!(collect("a.*.b", &empty), vec![("a.*".to_string(), Found::ParentNotFound, None)]);
    let scalar = data_map! {"a" => 3i64};
    assert_eq!(collect("a.*", &scalar), vec![("a.*".to_string(), Found::ParentNotFound, None)]);
  }

  #[test]
  fn walk_totality_and_break() {
    // Every combination yields at least one context.
    let samples = [
      Data::Null,
      Data::from(42i64),
      data_map! {"k" => "v"},
      Data::Sequence(vec![Data::from(1i64)]),
      data_map! {"nested" => data_map!{"deep" => vec![Data::Null]}},
    ];
    for data in &samples {
      for expr in ["", "k", "k.x", "*", "nested.deep[]", "[0]", "a[].b"] {
        let mut count = 0;
        Path::parse(expr).unwrap().walk(data, |_| count += 1);
        assert!(count >= 1, "no context for {:?} over {:?}", expr, data);
      }
    }

    // Break stops after the current visitor invocation.
    let data = data_map! {"seq" => vec![Data::from(1i64), Data::from(2i64), Data::from(3i64)]};
    let mut seen = 0;
    Path::parse("seq[]").unwrap().walk(&data, |ctx| {
      seen += 1;
      ctx.stop();
    });
    assert_eq!(seen, 1);
  }

  #[test]
  fn walk_conservation() {
    // Every Found context can be re-traversed via its reconstructed path.
    let data = data_map! {
      "array" => vec![
        data_map!{"field" => vec![Data::from("a"), Data::from("b")]},
        data_map!{"field" => vec![Data::from("c")]},
      ],
      "plain" => data_map!{"x" => 9i64}
    };

    for expr in ["array[].field[]", "plain.x", "plain.*", "array[0].field[1]"] {
      Path::parse(expr).unwrap().walk(&data, |ctx| {
        if ctx.found == Found::Found {
          let again = ctx.path.first(&data);
          assert_eq!(again.found, Found::Found, "{}", ctx.path);
          assert_eq!(again.value.as_ref(), ctx.value, "{}", ctx.path);
        }
      });
    }
  }

  #[test]
  fn first_stops_early() {
    let data = data_map! {"seq" => vec![Data::from("x"), Data::from("y")]};
    let located = Path::parse("seq[]").unwrap().first(&data);
    assert_eq!(located.found, Found::Found);
    assert_eq!(located.value, Some(Data::from("x")));
    assert_eq!(located.path.to_string(), "seq[0]");
    assert_eq!(located.index, Some(0));
    assert_eq!(located.name, "");
  }
}
