//! Privacy redaction for user-submitted photos: finds faces, heads and
//! licence plates in an RGBA buffer and blurs them in place.

pub mod shared {
    pub mod constants;
    pub mod pixel_buffer;
    pub mod region;
}

pub mod detection {
    pub mod domain {
        pub mod detection;
        pub mod detection_error;
        pub mod edge_map;
        pub mod face_detector;
        pub mod object_detector;
        pub mod plate_detector;
        pub mod skin_region_detector;
    }
    pub mod infrastructure;
}

pub mod redaction {
    pub mod domain {
        pub mod overlap_resolver;
        pub mod region_policy;
    }
}

pub mod blurring {
    pub mod domain {
        pub mod region_blurrer;
    }
    pub mod infrastructure;
}

pub mod imaging {
    pub mod domain {
        pub mod image_io_error;
        pub mod image_reader;
        pub mod image_writer;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod infrastructure {
        pub mod batch_redactor;
    }
    pub mod privacy_protector;
    pub mod redaction_config;
}
