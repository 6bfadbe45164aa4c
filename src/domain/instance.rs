use std::path::Path;

use tracing::debug;

use crate::domain::{Cost, Matrix};
use crate::error::{Error, Result};

/// Largest value accepted for "unbounded" fields (depot closing time,
/// default capacity). Kept at the 32-bit limit so merged segment arithmetic
/// stays far away from `i64` overflow.
const UNBOUNDED: Cost = i32::MAX as Cost;

/// A single location. Index 0 is the depot; it has zero demand, service
/// duration and release time, and an unbounded closing time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Client {
    pub x: Cost,
    pub y: Cost,
    pub demand: Cost,
    pub serv_dur: Cost,
    pub tw_early: Cost,
    pub tw_late: Cost,
    pub release: Cost,
}

/// Immutable problem data: clients, fleet, and the travel cost matrix
/// (travel time is identical to distance).
#[derive(Debug, Clone)]
pub struct ProblemData {
    clients: Vec<Client>,
    dist: Matrix<Cost>,
    num_clients: usize,
    num_vehicles: usize,
    capacity: Cost,
}

impl ProblemData {
    pub fn new(
        clients: Vec<Client>,
        num_vehicles: usize,
        capacity: Cost,
        dist: Matrix<Cost>,
    ) -> Result<Self> {
        if clients.is_empty() {
            return Err(Error::InvalidInstance("no locations given".into()));
        }

        if dist.num_rows() != clients.len() || dist.num_cols() != clients.len() {
            return Err(Error::InvalidInstance(
                "distance matrix does not match problem size".into(),
            ));
        }

        if num_vehicles == 0 {
            return Err(Error::InvalidInstance("empty fleet".into()));
        }

        Ok(Self {
            num_clients: clients.len() - 1,
            clients,
            dist,
            num_vehicles,
            capacity,
        })
    }

    /// Parses a TSPLIB-like instance file. See the crate documentation for
    /// the accepted sections.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::InvalidInstance(format!("cannot open {}: {err}", path.display()))
        })?;

        let data = Self::parse(&text)?;
        debug!(
            clients = data.num_clients,
            vehicles = data.num_vehicles,
            capacity = data.capacity,
            "parsed instance {}",
            path.display()
        );

        Ok(data)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Parser::new(text).run()
    }

    #[inline]
    pub fn dist(&self, first: usize, second: usize) -> Cost {
        self.dist.get(first, second)
    }

    pub fn distance_matrix(&self) -> &Matrix<Cost> {
        &self.dist
    }

    #[inline]
    pub fn client(&self, idx: usize) -> &Client {
        &self.clients[idx]
    }

    pub fn depot(&self) -> &Client {
        self.client(0)
    }

    pub fn num_clients(&self) -> usize {
        self.num_clients
    }

    pub fn num_vehicles(&self) -> usize {
        self.num_vehicles
    }

    pub fn capacity(&self) -> Cost {
        self.capacity
    }
}

/// Token-stream parser for the instance format. NAME, COMMENT and TYPE lines
/// are skipped wholesale; every other section is read as whitespace-separated
/// tokens, so values may wrap lines freely.
struct Parser<'a> {
    tokens: std::vec::IntoIter<&'a str>,
    num_clients: Option<usize>,
    capacity: Cost,
    num_vehicles: usize,
    edge_weight_type: String,
    edge_weight_fmt: String,
    coords: Vec<(Cost, Cost)>,
    demands: Vec<Cost>,
    serv_durs: Vec<Cost>,
    time_windows: Vec<(Cost, Cost)>,
    releases: Vec<Cost>,
    dist: Vec<Vec<Cost>>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let tokens: Vec<&str> = text
            .lines()
            .filter(|line| {
                let head = line.trim_start();
                !(head.starts_with("NAME")
                    || head.starts_with("COMMENT")
                    || head.starts_with("TYPE"))
            })
            .flat_map(str::split_whitespace)
            .collect();

        Self {
            tokens: tokens.into_iter(),
            num_clients: None,
            capacity: UNBOUNDED,
            num_vehicles: 0,
            edge_weight_type: String::new(),
            edge_weight_fmt: String::new(),
            coords: Vec::new(),
            demands: Vec::new(),
            serv_durs: Vec::new(),
            time_windows: Vec::new(),
            releases: Vec::new(),
            dist: Vec::new(),
        }
    }

    fn run(mut self) -> Result<ProblemData> {
        while let Some(section) = self.tokens.next() {
            if section == "EOF" {
                break;
            }

            match section {
                s if s.starts_with("DIMENSION") => self.read_dimension()?,
                s if s.starts_with("EDGE_WEIGHT_TYPE") => self.read_edge_weight_type()?,
                s if s.starts_with("EDGE_WEIGHT_FORMAT") => {
                    self.expect_separator()?;
                    self.edge_weight_fmt = self.next_token()?.to_owned();
                }
                s if s.starts_with("CAPACITY") => {
                    self.expect_separator()?;
                    self.capacity = self.next_value("CAPACITY")?;
                }
                s if s.starts_with("VEHICLES") => {
                    self.expect_separator()?;
                    self.num_vehicles = self.next_value::<usize>("VEHICLES")?;
                }
                "EDGE_WEIGHT_SECTION" => self.read_edge_weights()?,
                "NODE_COORD_SECTION" => self.read_coords()?,
                "DEMAND_SECTION" => self.read_demands()?,
                "SERVICE_TIME_SECTION" => self.read_service_times()?,
                "RELEASE_TIME_SECTION" => self.read_release_times()?,
                "TIME_WINDOW_SECTION" => self.read_time_windows()?,
                "DEPOT_SECTION" => self.read_depot_section()?,
                other => {
                    return Err(Error::InvalidInstance(format!(
                        "section {other} not understood"
                    )))
                }
            }
        }

        self.finish()
    }

    fn finish(mut self) -> Result<ProblemData> {
        let n = self.dimension()?;

        if self.edge_weight_type == "EUC_2D" {
            // One decimal of precision is retained by scaling by ten before
            // the truncating cast.
            self.dist = (0..=n)
                .map(|i| {
                    (0..=n)
                        .map(|j| {
                            let dx = (self.coords[i].0 - self.coords[j].0) as f64;
                            let dy = (self.coords[i].1 - self.coords[j].1) as f64;
                            (10.0 * dx.hypot(dy)) as Cost
                        })
                        .collect()
                })
                .collect();
        }

        if self.dist.len() != n + 1 {
            return Err(Error::InvalidInstance(
                "distance matrix does not match problem size".into(),
            ));
        }

        let clients = (0..=n)
            .map(|idx| Client {
                x: self.coords[idx].0,
                y: self.coords[idx].1,
                demand: self.demands[idx],
                serv_dur: self.serv_durs[idx],
                tw_early: self.time_windows[idx].0,
                tw_late: self.time_windows[idx].1,
                release: self.releases[idx],
            })
            .collect();

        let num_vehicles = if self.num_vehicles == 0 {
            // Unset, so assume an unbounded fleet: as many vehicles as there
            // are clients.
            n
        } else {
            self.num_vehicles
        };

        ProblemData::new(clients, num_vehicles, self.capacity, Matrix::from_rows(self.dist))
    }

    fn dimension(&self) -> Result<usize> {
        self.num_clients
            .ok_or_else(|| Error::InvalidInstance("missing DIMENSION".into()))
    }

    fn next_token(&mut self) -> Result<&'a str> {
        self.tokens
            .next()
            .ok_or_else(|| Error::InvalidInstance("unexpected end of file".into()))
    }

    fn expect_separator(&mut self) -> Result<()> {
        self.next_token().map(|_| ())
    }

    fn next_value<T: std::str::FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next_token()?;
        token
            .parse()
            .map_err(|_| Error::InvalidInstance(format!("bad {what} value '{token}'")))
    }

    fn read_dimension(&mut self) -> Result<()> {
        self.expect_separator()?;
        let dimension = self.next_value::<usize>("DIMENSION")?;

        if dimension < 2 {
            return Err(Error::InvalidInstance(
                "DIMENSION must cover the depot and at least one client".into(),
            ));
        }

        let n = dimension - 1; // minus the depot
        self.num_clients = Some(n);

        self.coords = vec![(0, 0); n + 1];
        self.demands = vec![0; n + 1];
        self.serv_durs = vec![0; n + 1];
        self.time_windows = vec![(0, UNBOUNDED); n + 1];
        self.releases = vec![0; n + 1];

        Ok(())
    }

    fn read_edge_weight_type(&mut self) -> Result<()> {
        self.expect_separator()?;
        self.edge_weight_type = self.next_token()?.to_owned();

        if self.edge_weight_type != "EXPLICIT" && self.edge_weight_type != "EUC_2D" {
            return Err(Error::InvalidInstance(
                "only EDGE_WEIGHT_TYPE = EXPLICIT or EDGE_WEIGHT_TYPE = EUC_2D are understood"
                    .into(),
            ));
        }

        Ok(())
    }

    fn read_edge_weights(&mut self) -> Result<()> {
        if self.edge_weight_type != "EXPLICIT" || self.edge_weight_fmt != "FULL_MATRIX" {
            return Err(Error::InvalidInstance(
                "only EDGE_WEIGHT_FORMAT = FULL_MATRIX is understood when EDGE_WEIGHT_TYPE = EXPLICIT"
                    .into(),
            ));
        }

        let n = self.dimension()?;
        for _ in 0..=n {
            let mut row = Vec::with_capacity(n + 1);
            for _ in 0..=n {
                row.push(self.next_value("EDGE_WEIGHT_SECTION")?);
            }
            self.dist.push(row);
        }

        Ok(())
    }

    /// Reads `n + 1` rows of `id` followed by `values` entries, storing them
    /// through `store` at `id - 1` (ids are 1-based, with the depot first).
    fn read_rows(
        &mut self,
        section: &str,
        values: usize,
        mut store: impl FnMut(&mut Self, usize, &[Cost]),
    ) -> Result<()> {
        let n = self.dimension()?;
        let mut row = vec![0; values];

        for _ in 0..=n {
            let id = self.next_value::<usize>(section)?;
            if id == 0 || id > n + 1 {
                return Err(Error::InvalidInstance(format!(
                    "{section}: id {id} out of range"
                )));
            }

            for slot in row.iter_mut() {
                *slot = self.next_value(section)?;
            }

            store(self, id - 1, &row);
        }

        Ok(())
    }

    fn read_coords(&mut self) -> Result<()> {
        self.read_rows("NODE_COORD_SECTION", 2, |parser, idx, row| {
            parser.coords[idx] = (row[0], row[1]);
        })
    }

    fn read_demands(&mut self) -> Result<()> {
        self.read_rows("DEMAND_SECTION", 1, |parser, idx, row| {
            parser.demands[idx] = row[0];
        })?;

        if self.demands[0] != 0 {
            return Err(Error::InvalidInstance("nonzero depot demand".into()));
        }

        Ok(())
    }

    fn read_service_times(&mut self) -> Result<()> {
        self.read_rows("SERVICE_TIME_SECTION", 1, |parser, idx, row| {
            parser.serv_durs[idx] = row[0];
        })?;

        if self.serv_durs[0] != 0 {
            return Err(Error::InvalidInstance(
                "nonzero depot service duration".into(),
            ));
        }

        Ok(())
    }

    fn read_release_times(&mut self) -> Result<()> {
        self.read_rows("RELEASE_TIME_SECTION", 1, |parser, idx, row| {
            parser.releases[idx] = row[0];
        })?;

        if self.releases[0] != 0 {
            return Err(Error::InvalidInstance("nonzero depot release time".into()));
        }

        Ok(())
    }

    fn read_time_windows(&mut self) -> Result<()> {
        let n = self.dimension()?;

        for _ in 0..=n {
            let id = self.next_value::<usize>("TIME_WINDOW_SECTION")?;
            if id == 0 || id > n + 1 {
                return Err(Error::InvalidInstance(format!(
                    "TIME_WINDOW_SECTION: id {id} out of range"
                )));
            }

            let early = self.next_value::<Cost>("TIME_WINDOW_SECTION")?;
            let late = self.next_value::<Cost>("TIME_WINDOW_SECTION")?;

            if early >= late {
                return Err(Error::InvalidInstance(format!(
                    "client {id}: twEarly (={early}) >= twLate (={late})"
                )));
            }

            self.time_windows[id - 1] = (early, late);
        }

        if self.time_windows[0].0 != 0 {
            return Err(Error::InvalidInstance("nonzero depot twEarly".into()));
        }

        Ok(())
    }

    fn read_depot_section(&mut self) -> Result<()> {
        let depot = self.next_value::<i64>("DEPOT_SECTION")?;
        if depot != 1 {
            return Err(Error::InvalidInstance("depot id is supposed to be 1".into()));
        }

        let end = self.next_value::<i64>("DEPOT_SECTION")?;
        if end != -1 {
            return Err(Error::InvalidInstance("expected only one depot".into()));
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::SMALL;
    use super::*;

    #[test]
    fn parses_explicit_instance() {
        let data = ProblemData::parse(SMALL).unwrap();

        assert_eq!(data.num_clients(), 4);
        assert_eq!(data.num_vehicles(), 3);
        assert_eq!(data.capacity(), 10);
        assert_eq!(data.dist(0, 4), 4);
        assert_eq!(data.dist(3, 1), 2);
        assert_eq!(data.client(1).demand, 5);
        assert_eq!(data.client(1).serv_dur, 1);
        assert_eq!(data.client(2).tw_late, 500);
        assert_eq!(data.depot().demand, 0);
    }

    #[test]
    fn euc_2d_distances_keep_one_decimal() {
        let text = "\
DIMENSION : 3
EDGE_WEIGHT_TYPE : EUC_2D
NODE_COORD_SECTION
1 0 0
2 3 4
3 1 1
DEMAND_SECTION
1 0
2 1
3 1
DEPOT_SECTION
1
-1
EOF
";
        let data = ProblemData::parse(text).unwrap();

        assert_eq!(data.dist(0, 1), 50); // 10 * 5.0
        assert_eq!(data.dist(0, 2), 14); // floor(10 * sqrt(2))
        assert_eq!(data.dist(1, 2), 36); // floor(10 * sqrt(13))

        // No VEHICLES section, so the fleet defaults to one per client.
        assert_eq!(data.num_vehicles(), 2);
        assert_eq!(data.capacity(), UNBOUNDED);
    }

    #[test]
    fn rejects_unsupported_edge_weight_type() {
        let text = "DIMENSION : 2\nEDGE_WEIGHT_TYPE : CEIL_2D\nEOF\n";
        assert!(matches!(
            ProblemData::parse(text),
            Err(Error::InvalidInstance(_))
        ));
    }

    #[test]
    fn rejects_bad_time_window() {
        let text = "\
DIMENSION : 2
EDGE_WEIGHT_TYPE : EUC_2D
NODE_COORD_SECTION
1 0 0
2 1 0
TIME_WINDOW_SECTION
1 0 10
2 5 5
EOF
";
        assert!(matches!(
            ProblemData::parse(text),
            Err(Error::InvalidInstance(_))
        ));
    }

    #[test]
    fn rejects_nonzero_depot_demand() {
        let text = "\
DIMENSION : 2
EDGE_WEIGHT_TYPE : EUC_2D
NODE_COORD_SECTION
1 0 0
2 1 0
DEMAND_SECTION
1 2
2 1
EOF
";
        assert!(matches!(
            ProblemData::parse(text),
            Err(Error::InvalidInstance(_))
        ));
    }

    #[test]
    fn rejects_unknown_section() {
        let text = "DIMENSION : 2\nPICKUP_SECTION\nEOF\n";
        assert!(matches!(
            ProblemData::parse(text),
            Err(Error::InvalidInstance(_))
        ));
    }

    #[test]
    fn rejects_malformed_depot_section() {
        let text = "\
DIMENSION : 2
EDGE_WEIGHT_TYPE : EUC_2D
NODE_COORD_SECTION
1 0 0
2 1 0
DEPOT_SECTION
2
-1
EOF
";
        assert!(matches!(
            ProblemData::parse(text),
            Err(Error::InvalidInstance(_))
        ));
    }

    #[test]
    fn missing_file_is_invalid_instance() {
        let err = ProblemData::from_file("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, Error::InvalidInstance(_)));
    }
}
