use crate::signals::DomId;
use std::collections::{BTreeMap, BTreeSet};
use annotate_snippets::{Level, Renderer, Snippet};
use std::fmt;
use std::ops::Range;
use winnow::ascii::{dec_int, dec_uint, newline};
use winnow::combinator::{opt, preceded, repeat, separated, separated_pair, terminated};
use winnow::error::ContextError;
use winnow::Parser;

/// Local coincidence topology of the detector.
///
/// The [`NeighborGraph`] is an undirected relation over [`DomId`]s. It also
/// acts as the geometry of the simulation: only DOMs present in the graph
/// (isolated or not) can receive pulses.
///
/// DOMs are stored in a flat array and neighbors are referenced by index into
/// that array.
#[derive(Clone, Debug, Default)]
pub struct NeighborGraph {
    sensors: Vec<DomId>,
    index: BTreeMap<DomId, usize>,
    adjacency: Vec<Vec<usize>>,
}

impl NeighborGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph where DOMs on the same string are neighbors if they
    /// are at most `span` positions apart.
    ///
    /// # Examples
    ///
    /// ```
    /// use domlauncher::graph::NeighborGraph;
    /// use domlauncher::signals::DomId;
    ///
    /// let doms = (1..=4).map(|om| DomId::new(47, om));
    /// let graph = NeighborGraph::with_lc_span(doms, 2);
    ///
    /// let neighbors: Vec<_> = graph.neighbors(&DomId::new(47, 1)).collect();
    /// assert_eq!(neighbors, vec![DomId::new(47, 2), DomId::new(47, 3)]);
    /// ```
    pub fn with_lc_span<I>(doms: I, span: u32) -> Self
    where
        I: IntoIterator<Item = DomId>,
    {
        let mut graph = Self::new();
        for dom in doms {
            graph.add_sensor(dom);
        }

        let mut by_string: BTreeMap<i32, Vec<DomId>> = BTreeMap::new();
        for dom in &graph.sensors {
            by_string.entry(dom.string).or_default().push(*dom);
        }
        for doms in by_string.values() {
            for (i, a) in doms.iter().enumerate() {
                for b in &doms[i + 1..] {
                    if a.om.abs_diff(b.om) <= span {
                        graph.connect(*a, *b);
                    }
                }
            }
        }

        graph
    }

    /// Adds a DOM without neighbors. Returns its index. Adding a DOM twice is
    /// a no-op.
    pub fn add_sensor(&mut self, dom: DomId) -> usize {
        if let Some(&index) = self.index.get(&dom) {
            return index;
        }
        let index = self.sensors.len();
        self.sensors.push(dom);
        self.adjacency.push(Vec::new());
        self.index.insert(dom, index);

        index
    }

    /// Makes `a` and `b` neighbors of each other, adding them if needed.
    /// Returns whether the link is new. A DOM is never its own neighbor.
    pub fn connect(&mut self, a: DomId, b: DomId) -> bool {
        let ia = self.add_sensor(a);
        let ib = self.add_sensor(b);
        if ia == ib || self.adjacency[ia].contains(&ib) {
            return false;
        }
        self.adjacency[ia].push(ib);
        self.adjacency[ib].push(ia);

        true
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn contains(&self, dom: &DomId) -> bool {
        self.index.contains_key(dom)
    }

    pub fn index_of(&self, dom: &DomId) -> Option<usize> {
        self.index.get(dom).copied()
    }

    /// All DOMs, in index order.
    pub fn sensors(&self) -> &[DomId] {
        &self.sensors
    }

    /// Indices of the neighbors of the DOM at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn neighbor_indices(&self, index: usize) -> &[usize] {
        &self.adjacency[index]
    }

    /// Neighbors of `dom`. A DOM that is not in the graph has no neighbors.
    pub fn neighbors(&self, dom: &DomId) -> impl Iterator<Item = DomId> + '_ {
        self.index_of(dom)
            .map(|index| self.adjacency[index].as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&n| self.sensors[n])
    }

    fn links(&self) -> BTreeMap<DomId, BTreeSet<DomId>> {
        self.sensors
            .iter()
            .map(|dom| (*dom, self.neighbors(dom).collect()))
            .collect()
    }
}

impl PartialEq for NeighborGraph {
    /// Two graphs are equal if they have the same DOMs and the same links,
    /// regardless of insertion order.
    fn eq(&self, other: &Self) -> bool {
        self.links() == other.links()
    }
}

impl Eq for NeighborGraph {}

impl FromIterator<(DomId, DomId)> for NeighborGraph {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (DomId, DomId)>,
    {
        let mut graph = Self::new();
        for (a, b) in iter {
            graph.connect(a, b);
        }

        graph
    }
}

impl<const N: usize> From<[(DomId, DomId); N]> for NeighborGraph {
    /// Converts an array of links into a `NeighborGraph`.
    ///
    /// # Examples
    ///
    /// ```
    /// use domlauncher::graph::NeighborGraph;
    /// use domlauncher::signals::DomId;
    ///
    /// let a = DomId::new(1, 1);
    /// let b = DomId::new(1, 2);
    /// let graph1 = NeighborGraph::from([(a, b)]);
    /// let graph2: NeighborGraph = [(b, a), (a, b)].into();
    /// assert_eq!(graph1, graph2);
    /// ```
    fn from(arr: [(DomId, DomId); N]) -> Self {
        Self::from_iter(arr)
    }
}

impl fmt::Display for NeighborGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .links()
            .into_iter()
            .map(|(dom, neighbors)| {
                let mut line = format!("{dom} ->");
                for neighbor in neighbors {
                    line.push_str(&format!(" {neighbor}"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n");

        write!(f, "{text}")
    }
}

fn dom_id(input: &mut &str) -> winnow::Result<DomId> {
    separated_pair(dec_int, '-', dec_uint)
        .map(|(string, om)| DomId::new(string, om))
        .parse_next(input)
}

fn parse_line(input: &mut &str) -> winnow::Result<(DomId, Vec<DomId>)> {
    (dom_id, " ->", repeat(0.., preceded(' ', dom_id)))
        .map(|(dom, _, neighbors)| (dom, neighbors))
        .parse_next(input)
}

/// The error type returned when parsing a [`NeighborGraph`] fails.
///
/// Only the offending line is kept; everything from the point where parsing
/// stopped to the end of that line is reported as unexpected.
#[derive(Debug)]
pub struct ParseError {
    line: usize,
    text: String,
    span: Range<usize>,
}

impl ParseError {
    fn from_parse(error: winnow::error::ParseError<&str, ContextError>) -> Self {
        let input = *error.input();
        let offset = error.offset().min(input.len());
        let start = input[..offset].rfind('\n').map_or(0, |i| i + 1);
        let end = input[offset..].find('\n').map_or(input.len(), |i| offset + i);

        Self {
            line: input[..start].matches('\n').count() + 1,
            text: input[start..end].to_string(),
            span: offset - start..end - start,
        }
    }

    /// Line number (starting at 1) of the invalid neighbor list.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = format!("invalid neighbor list on line {}", self.line);
        let label = if self.span.is_empty() {
            "expected `<string>-<om> -> <neighbors>`"
        } else {
            "not a DOM or a separator"
        };
        let message = Level::Error.title(&title).snippet(
            Snippet::source(&self.text)
                .line_start(self.line)
                .annotation(Level::Error.span(self.span.clone()).label(label)),
        );

        let result = write!(f, "{}", Renderer::plain().render(message));
        result
    }
}

impl std::error::Error for ParseError {}

impl std::str::FromStr for NeighborGraph {
    type Err = ParseError;

    /// Parse a [`NeighborGraph`] from a string with one line per DOM:
    /// `47-2 -> 47-1 47-3`. Links are undirected, so listing a link on
    /// either side (or both) is enough.
    ///
    /// # Examples
    ///
    /// ```
    /// # use domlauncher::graph::NeighborGraph;
    /// # use domlauncher::signals::DomId;
    /// use std::str::FromStr;
    ///
    /// let graph = NeighborGraph::from_str("47-1 -> 47-2\n47-15 ->\n")?;
    /// assert!(graph.contains(&DomId::new(47, 15)));
    /// assert_eq!(graph.neighbors(&DomId::new(47, 2)).count(), 1);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let lines: Vec<(DomId, Vec<DomId>)> =
            terminated(separated(0.., parse_line, newline), opt(newline))
                .parse(input)
                .map_err(ParseError::from_parse)?;

        let mut graph = Self::new();
        for (dom, neighbors) in lines {
            graph.add_sensor(dom);
            for neighbor in neighbors {
                graph.connect(dom, neighbor);
            }
        }

        Ok(graph)
    }
}
