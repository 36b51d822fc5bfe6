//! Static landmark topology of the MediaPipe Face Mesh.
//!
//! Each [`Topology`] is a named, ordered list of [`Connection`]s between landmark indices that
//! outlines one region of the face. The indices refer to the fixed landmark layout produced by the
//! Face Mesh model: `0..468` for the face mesh itself, and `468..478` for the iris landmarks that are
//! only present when iris refinement is enabled (see [`mesh`][super::mesh]).
//!
//! "Left" and "Right" are from the point of view of the depicted person.

use std::fmt;

use itertools::Itertools;

/// An edge between two landmarks, identified by their index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    start: u16,
    end: u16,
}

impl Connection {
    #[inline]
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Index of the landmark the edge starts at.
    #[inline]
    pub fn start(&self) -> usize {
        self.start.into()
    }

    /// Index of the landmark the edge ends at.
    #[inline]
    pub fn end(&self) -> usize {
        self.end.into()
    }
}

const fn c(start: u16, end: u16) -> Connection {
    Connection::new(start, end)
}

/// A named list of [`Connection`]s describing one facial region.
#[derive(Debug)]
pub struct Topology {
    name: &'static str,
    connections: &'static [Connection],
}

impl Topology {
    pub const fn new(name: &'static str, connections: &'static [Connection]) -> Self {
        Self { name, connections }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn connections(&self) -> &'static [Connection] {
        self.connections
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns the largest landmark index referenced by this topology.
    pub fn max_index(&self) -> Option<usize> {
        self.connections
            .iter()
            .map(|conn| conn.start().max(conn.end()))
            .max()
    }

    /// Returns the minimum number of landmarks a landmark set needs for every connection in this
    /// topology to be drawable.
    pub fn required_landmarks(&self) -> usize {
        self.max_index().map_or(0, |max| max + 1)
    }

    /// Returns the distinct landmark indices referenced by this topology, in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.connections
            .iter()
            .flat_map(|conn| [conn.start(), conn.end()])
            .sorted_unstable()
            .dedup()
    }

    /// Checks that every connection joins two distinct landmarks below `num_landmarks`.
    pub fn validate(&self, num_landmarks: usize) -> Result<(), InvalidConnection> {
        for (position, &connection) in self.connections.iter().enumerate() {
            if connection.start == connection.end
                || connection.start() >= num_landmarks
                || connection.end() >= num_landmarks
            {
                return Err(InvalidConnection {
                    topology: self.name,
                    position,
                    connection,
                    num_landmarks,
                });
            }
        }
        Ok(())
    }
}

/// Error returned by [`Topology::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidConnection {
    topology: &'static str,
    position: usize,
    connection: Connection,
    num_landmarks: usize,
}

impl InvalidConnection {
    /// Returns the offending connection.
    pub fn connection(&self) -> Connection {
        self.connection
    }
}

impl fmt::Display for InvalidConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connection #{} ({} -> {}) of topology '{}' is invalid for {} landmarks",
            self.position,
            self.connection.start,
            self.connection.end,
            self.topology,
            self.num_landmarks,
        )
    }
}

impl std::error::Error for InvalidConnection {}

/// All built-in topologies.
pub static ALL: [&Topology; 9] = [
    &TESSELATION,
    &RIGHT_EYE,
    &LEFT_EYE,
    &RIGHT_EYEBROW,
    &LEFT_EYEBROW,
    &LIPS,
    &FACE_OVAL,
    &RIGHT_IRIS,
    &LEFT_IRIS,
];

/// Triangulated surface mesh over the whole face.
///
/// This is a reduced subset of the full Face Mesh tessellation: it covers the eye, brow, nose, mouth
/// and cheek regions with closed triangles.
pub static TESSELATION: Topology = Topology::new(
    "tessellation",
    &[
        c(127, 34), c(34, 139), c(139, 127), c(11, 0), c(0, 37), c(37, 11),
        c(232, 231), c(231, 120), c(120, 232), c(72, 37), c(37, 0), c(0, 72),
        c(262, 369), c(369, 267), c(267, 262), c(302, 269), c(269, 291), c(291, 302),
        c(145, 52), c(52, 64), c(64, 145), c(375, 291), c(291, 308), c(308, 375),
        c(425, 200), c(200, 421), c(421, 425), c(335, 424), c(424, 406), c(406, 335),
        c(418, 421), c(421, 200), c(200, 418), c(329, 435), c(435, 406), c(406, 329),
        c(391, 429), c(429, 423), c(423, 391), c(331, 416), c(416, 433), c(433, 331),
        c(366, 447), c(447, 345), c(345, 366), c(357, 350), c(350, 452), c(452, 357),
        c(113, 225), c(225, 224), c(224, 113), c(229, 228), c(228, 117), c(117, 229),
        c(111, 117), c(117, 228), c(228, 111), c(215, 214), c(214, 207), c(207, 215),
        c(212, 202), c(202, 204), c(204, 212), c(165, 92), c(92, 186), c(186, 165),
        c(203, 206), c(206, 98), c(98, 203), c(36, 101), c(101, 205), c(205, 36),
        c(203, 98), c(98, 129), c(129, 203), c(54, 68), c(68, 104), c(104, 54),
        c(70, 63), c(63, 105), c(105, 70), c(171, 140), c(140, 170), c(170, 171),
        c(153, 155), c(155, 133), c(133, 153), c(154, 145), c(145, 144), c(144, 154),
        c(161, 163), c(163, 246), c(246, 161), c(173, 155), c(155, 157), c(157, 173),
        c(160, 159), c(159, 158), c(158, 160), c(147, 123), c(123, 116), c(116, 147),
        c(148, 176), c(176, 149), c(149, 148), c(131, 25), c(25, 110), c(110, 131),
        c(88, 178), c(178, 87), c(87, 88), c(95, 78), c(78, 191), c(191, 95),
        c(81, 82), c(82, 13), c(13, 81), c(311, 402), c(402, 311), c(296, 336),
        c(336, 9), c(9, 296), c(285, 8), c(8, 417), c(417, 285), c(334, 296),
        c(296, 293), c(293, 334), c(6, 122), c(122, 196), c(196, 6), c(351, 6),
        c(6, 419), c(419, 351), c(326, 2), c(2, 393), c(393, 326), c(418, 262),
        c(262, 431), c(431, 418), c(424, 335), c(335, 406), c(406, 424), c(251, 389),
        c(389, 356), c(356, 251), c(222, 221), c(221, 189), c(189, 222), c(226, 113),
        c(113, 207), c(207, 226), c(214, 192), c(192, 203), c(203, 214), c(105, 66),
        c(66, 107), c(107, 105), c(52, 65), c(65, 55), c(55, 52),
    ],
);

/// Contour of the right eye (from the subject's point of view; left side of an unmirrored image).
pub static RIGHT_EYE: Topology = Topology::new(
    "right eye",
    &[
        c(33, 7), c(7, 163), c(163, 144), c(144, 145), c(145, 153), c(153, 154),
        c(154, 155), c(155, 133), c(33, 246), c(246, 161), c(161, 160), c(160, 159),
        c(159, 158), c(158, 157), c(157, 173), c(173, 133),
    ],
);

/// Contour of the left eye.
pub static LEFT_EYE: Topology = Topology::new(
    "left eye",
    &[
        c(263, 249), c(249, 390), c(390, 373), c(373, 374), c(374, 380), c(380, 381),
        c(381, 382), c(382, 362), c(263, 466), c(466, 388), c(388, 387), c(387, 386),
        c(386, 385), c(385, 384), c(384, 398), c(398, 362),
    ],
);

/// Upper and lower edge of the right eyebrow.
pub static RIGHT_EYEBROW: Topology = Topology::new(
    "right eyebrow",
    &[
        c(46, 53), c(53, 52), c(52, 65), c(65, 55), c(70, 63), c(63, 105),
        c(105, 66), c(66, 107),
    ],
);

/// Upper and lower edge of the left eyebrow.
pub static LEFT_EYEBROW: Topology = Topology::new(
    "left eyebrow",
    &[
        c(276, 283), c(283, 282), c(282, 295), c(295, 285), c(300, 293), c(293, 334),
        c(334, 296), c(296, 336),
    ],
);

/// Outer and inner contour of the lips.
pub static LIPS: Topology = Topology::new(
    "lips",
    &[
        c(61, 146), c(146, 91), c(91, 181), c(181, 84), c(84, 17), c(17, 314),
        c(314, 405), c(405, 321), c(321, 375), c(375, 291), c(61, 185), c(185, 40),
        c(40, 39), c(39, 37), c(37, 0), c(0, 267), c(267, 269), c(269, 270),
        c(270, 409), c(409, 291), c(78, 95), c(95, 88), c(88, 178), c(178, 87),
        c(87, 14), c(14, 317), c(317, 402), c(402, 318), c(318, 324), c(324, 308),
        c(78, 191), c(191, 80), c(80, 81), c(81, 82), c(82, 13), c(13, 312),
        c(312, 311), c(311, 310), c(310, 415), c(415, 308),
    ],
);

/// Closed outline of the face, starting and ending at the top of the forehead.
pub static FACE_OVAL: Topology = Topology::new(
    "face oval",
    &[
        c(10, 338), c(338, 297), c(297, 332), c(332, 284), c(284, 251), c(251, 389),
        c(389, 356), c(356, 454), c(454, 323), c(323, 361), c(361, 288), c(288, 397),
        c(397, 365), c(365, 379), c(379, 378), c(378, 400), c(400, 377), c(377, 152),
        c(152, 148), c(148, 176), c(176, 149), c(149, 150), c(150, 136), c(136, 172),
        c(172, 58), c(58, 132), c(132, 93), c(93, 234), c(234, 127), c(127, 162),
        c(162, 21), c(21, 54), c(54, 103), c(103, 67), c(67, 109), c(109, 10),
    ],
);

/// Ring around the right iris.
///
/// Only available with iris refinement (478 landmarks).
pub static RIGHT_IRIS: Topology = Topology::new(
    "right iris",
    &[
        c(469, 470), c(470, 471), c(471, 472), c(472, 469),
    ],
);

/// Ring around the left iris.
///
/// Only available with iris refinement (478 landmarks).
pub static LEFT_IRIS: Topology = Topology::new(
    "left iris",
    &[
        c(474, 475), c(475, 476), c(476, 477), c(477, 474),
    ],
);
